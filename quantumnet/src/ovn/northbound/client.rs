use std::collections::BTreeMap;
use std::sync::Arc;
use quantumnet_schemas::domain::load_balancer::LoadBalancer;
use quantumnet_schemas::domain::network::{NetworkType, VirtualNetwork};
use quantumnet_schemas::domain::port::{BindingType, Port};
use quantumnet_schemas::domain::security_group::SecurityGroup;
use quantumnet_schemas::settings::NorthboundConfig;
use crate::ovn::components::acl::Acl;
use crate::ovn::components::address_set::AddressSet;
use crate::ovn::components::load_balancer::OvnLoadBalancer;
use crate::ovn::components::logical_router::LogicalRouter;
use crate::ovn::components::logical_router_port::LogicalRouterPort;
use crate::ovn::components::logical_switch::LogicalSwitch;
use crate::ovn::components::logical_switch_port::{LogicalSwitchPort, LogicalSwitchPortType};
use crate::ovn::components::port_group::PortGroup;
use crate::ovn::components::{external_ids, external_ids_from, ExternalIds, MacAddress, OvnIpAddr};
use crate::ovn::configuration::dhcp::{DhcpOptions, DhcpOptionsConfig};
use crate::ovn::configuration::nat::{Nat, OvnNatType};
use crate::ovn::configuration::route::LogicalRouterStaticRoute;
use crate::ovn::identity::{self, IdGenerator};
use crate::ovn::northbound::cache::CachingStore;
use crate::ovn::northbound::memory::InMemoryStore;
use crate::ovn::northbound::nbctl::NbctlStore;
use crate::ovn::northbound::ovsdb::OvsdbRow;
use crate::ovn::northbound::{Lookup, MapColumn, NbObject, NorthboundStore, Operation, RefColumn, StoreBackend, Table};
use crate::ovn::translator::{AclTranslator, SecurityGroupTranslation};
use crate::ovn::NorthboundError;

/// Result of creating a switch. DHCP options are created alongside when the network asks for
/// them, a failure there is reported here but does not undo the switch.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCreation {
    pub switch: LogicalSwitch,
    pub dhcp_options: Option<DhcpOptions>,
    pub dhcp_error: Option<NorthboundError>,
}

/// Manages the logical network objects of the platform in the Northbound database. One client
/// is shared by every caller in the process, all state lives in the store behind it.
pub struct NorthboundClient {
    store: Arc<dyn NorthboundStore>,
    ids: Arc<dyn IdGenerator>,
    translator: AclTranslator,
}

impl NorthboundClient {
    /// Connect to the configured database. When that fails and `use_mock_on_failure` is set the
    /// client runs against an in memory store for the rest of its life, there is no retry in the
    /// background.
    pub async fn connect(
        config: &NorthboundConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, NorthboundError> {
        let store: Arc<dyn NorthboundStore> = match NbctlStore::connect(config).await {
            Ok(store) => Arc::new(store),
            Err(err) if config.use_mock_on_failure => {
                tracing::warn!("{err}, falling back to the in memory Northbound store");
                Arc::new(InMemoryStore::new())
            }
            Err(err) => return Err(err),
        };
        let store: Arc<dyn NorthboundStore> = if config.enable_cache {
            Arc::new(CachingStore::new(store, config.cache_ttl()))
        } else {
            store
        };
        tracing::info!("Northbound client initialised in {} mode", store.backend());
        Ok(Self::with_store(store, ids))
    }

    pub fn with_store(store: Arc<dyn NorthboundStore>, ids: Arc<dyn IdGenerator>) -> Self {
        let translator = AclTranslator::new(ids.clone());
        Self { store, ids, translator }
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    pub fn mode(&self) -> StoreBackend {
        self.store.backend()
    }

    pub async fn close(&self) -> Result<(), NorthboundError> {
        tracing::info!("closing Northbound client");
        self.store.close().await
    }

    async fn fetch<T>(&self, lookup: Lookup) -> Result<Option<T>, NorthboundError>
    where
        T: OvsdbRow + TryFrom<NbObject, Error = NorthboundError>,
    {
        self.store.get(T::TABLE, &lookup).await?.map(T::try_from).transpose()
    }

    async fn require<T>(&self, lookup: Lookup) -> Result<T, NorthboundError>
    where
        T: OvsdbRow + TryFrom<NbObject, Error = NorthboundError>,
    {
        let name = lookup.as_str().to_string();
        self.fetch(lookup).await?.ok_or_else(|| NorthboundError::not_found(T::TABLE, name))
    }

    /// Like `require` but the object is the parent of something being created.
    async fn require_parent<T>(&self, parent: &str, child: &str) -> Result<T, NorthboundError>
    where
        T: OvsdbRow + TryFrom<NbObject, Error = NorthboundError>,
    {
        self.fetch(Lookup::name(parent)).await?.ok_or_else(|| NorthboundError::ParentNotFound {
            name: child.to_string(),
            parent: parent.to_string(),
        })
    }

    async fn find<T>(&self, key: &str, value: &str) -> Result<Vec<T>, NorthboundError>
    where
        T: OvsdbRow + TryFrom<NbObject, Error = NorthboundError>,
    {
        self.store.find_by_external_id(T::TABLE, key, value).await?
            .into_iter()
            .map(T::try_from)
            .collect()
    }

    async fn list<T>(&self) -> Result<Vec<T>, NorthboundError>
    where
        T: OvsdbRow + TryFrom<NbObject, Error = NorthboundError>,
    {
        self.store.list(T::TABLE).await?.into_iter().map(T::try_from).collect()
    }

    // switches

    pub async fn create_logical_switch(
        &self,
        network: &VirtualNetwork,
    ) -> Result<SwitchCreation, NorthboundError> {
        let name = identity::switch_name(&network.id);
        tracing::info!("creating logical switch {name} for {:?} network {}", network.spec.network_type, network.id);

        let mut switch = LogicalSwitch::new(self.ids.uuid(), name.clone());
        switch.external_ids = external_ids_from(&[
            (external_ids::NETWORK_ID, &network.id),
            (external_ids::PROJECT_ID, &network.project_id),
            (external_ids::NAME, &network.name),
        ]);
        match network.spec.network_type {
            NetworkType::Vlan => {
                if let Some(vlan) = &network.spec.vlan {
                    switch.other_config.insert("vlan".into(), vlan.vlan_id.to_string());
                }
            }
            NetworkType::Overlay if !network.spec.ip_config.ipv4_subnet.is_empty() => {
                switch.other_config.insert("subnet".into(), network.spec.ip_config.ipv4_subnet.clone());
            }
            _ => {}
        }
        if network.spec.mtu > 0 {
            switch.other_config.insert("mtu".into(), network.spec.mtu.to_string());
        }
        self.store.transact(vec![Operation::Insert(switch.clone().into())]).await?;
        tracing::info!("created logical switch {name} ({})", switch.uuid);

        let mut creation = SwitchCreation { switch, dhcp_options: None, dhcp_error: None };
        if network.spec.ip_config.dhcp.enabled {
            let result = match DhcpOptionsConfig::from_network(network, &name) {
                Some(config) => self.create_dhcp_options(&config).await,
                None => Err(NorthboundError::invalid("an IPv4 subnet is required for DHCP")),
            };
            match result {
                Ok(options) => creation.dhcp_options = Some(options),
                Err(err) => {
                    tracing::warn!("failed to create DHCP options for {name}: {err}");
                    creation.dhcp_error = Some(err);
                }
            }
        }
        Ok(creation)
    }

    pub async fn get_logical_switch(&self, network_id: &str) -> Result<LogicalSwitch, NorthboundError> {
        self.require(Lookup::name(identity::switch_name(network_id))).await
    }

    pub async fn list_logical_switches(&self) -> Result<Vec<LogicalSwitch>, NorthboundError> {
        self.list().await
    }

    /// Delete the switch with its ports and the DHCP options created for it.
    pub async fn delete_logical_switch(&self, network_id: &str) -> Result<(), NorthboundError> {
        let name = identity::switch_name(network_id);
        tracing::info!("deleting logical switch {name}");
        let mut operations = Vec::new();
        for options in self.find::<DhcpOptions>(external_ids::SWITCH, &name).await? {
            operations.push(Operation::Delete { table: Table::DhcpOptions, lookup: Lookup::uuid(options.uuid) });
        }
        if let Some(switch) = self.fetch::<LogicalSwitch>(Lookup::name(&name)).await? {
            for port in &switch.ports {
                operations.extend(self.port_group_detach(port).await?);
                operations.push(Operation::Delete { table: Table::LogicalSwitchPort, lookup: Lookup::uuid(port) });
            }
            operations.push(Operation::Delete { table: Table::LogicalSwitch, lookup: Lookup::uuid(switch.uuid) });
        }
        self.store.transact(operations).await
    }

    // switch ports

    pub async fn create_logical_switch_port(&self, port: &Port) -> Result<LogicalSwitchPort, NorthboundError> {
        let switch_name = identity::switch_name(&port.network_id);
        let name = identity::switch_port_name(&port.id);
        tracing::info!("creating logical switch port {name} on {switch_name}");
        let switch: LogicalSwitch = self.require_parent(&switch_name, &name).await?;
        let mac = MacAddress::new(port.spec.mac_address.clone())?;

        // "MAC IP1 IP2 ..."
        let mut address = vec![mac.get_string()];
        address.extend(port.spec.fixed_ips.iter().map(|ip| ip.ip_address.clone()));
        let address = address.join(" ");

        let port_type = match port.spec.binding.binding_type {
            BindingType::Direct => LogicalSwitchPortType::Direct,
            BindingType::VhostUser => LogicalSwitchPortType::VhostUser,
            BindingType::Normal | BindingType::Macvtap => LogicalSwitchPortType::Normal,
        };
        let mut lsp = LogicalSwitchPort::new(self.ids.uuid(), name.clone(), port_type);
        lsp.addresses = vec![address.clone()];
        lsp.enabled = Some(true);
        lsp.external_ids = external_ids_from(&[
            (external_ids::PORT_ID, &port.id),
            (external_ids::VM_ID, &port.status.vm_id),
        ]);
        if port.spec.port_security_enabled && !port.spec.security_group_ids.is_empty() {
            lsp.port_security = vec![address];
        }
        match port.spec.binding.binding_type {
            BindingType::Direct if !port.status.host_id.is_empty() => {
                lsp.options.insert("requested-chassis".into(), port.status.host_id.clone());
            }
            BindingType::VhostUser if !port.spec.binding.vhost_socket.is_empty() => {
                lsp.options.insert("vhost-sock".into(), port.spec.binding.vhost_socket.clone());
            }
            _ => {}
        }
        lsp.dhcpv4_options = self.find::<DhcpOptions>(external_ids::SWITCH, &switch_name).await?
            .into_iter()
            .next()
            .map(|options| options.uuid);

        self.store.transact(vec![
            Operation::Insert(lsp.clone().into()),
            Operation::AddRefs {
                table: Table::LogicalSwitch,
                lookup: Lookup::uuid(switch.uuid),
                column: RefColumn::Ports,
                uuids: vec![lsp.uuid.clone()],
            },
        ]).await?;
        tracing::info!("created logical switch port {name} ({}) with addresses {:?}", lsp.uuid, lsp.addresses);
        Ok(lsp)
    }

    pub async fn get_logical_switch_port(&self, port_id: &str) -> Result<LogicalSwitchPort, NorthboundError> {
        self.require(Lookup::name(identity::switch_port_name(port_id))).await
    }

    /// Removes the port from port groups that reference it.
    async fn port_group_detach(&self, port_uuid: &str) -> Result<Vec<Operation>, NorthboundError> {
        Ok(self.list::<PortGroup>().await?
            .into_iter()
            .filter(|group| group.ports.iter().any(|port| port == port_uuid))
            .map(|group| Operation::RemoveRefs {
                table: Table::PortGroup,
                lookup: Lookup::uuid(group.uuid),
                column: RefColumn::Ports,
                uuids: vec![port_uuid.to_string()],
            })
            .collect())
    }

    /// Delete the port and detach it from its switch and any security groups.
    pub async fn delete_logical_switch_port(&self, port_id: &str) -> Result<(), NorthboundError> {
        let name = identity::switch_port_name(port_id);
        tracing::info!("deleting logical switch port {name}");
        let Some(lsp) = self.fetch::<LogicalSwitchPort>(Lookup::name(&name)).await? else {
            return Ok(());
        };
        let mut operations: Vec<Operation> = self.list::<LogicalSwitch>().await?
            .into_iter()
            .filter(|switch| switch.ports.contains(&lsp.uuid))
            .map(|switch| Operation::RemoveRefs {
                table: Table::LogicalSwitch,
                lookup: Lookup::uuid(switch.uuid),
                column: RefColumn::Ports,
                uuids: vec![lsp.uuid.clone()],
            })
            .collect();
        operations.extend(self.port_group_detach(&lsp.uuid).await?);
        operations.push(Operation::Delete { table: Table::LogicalSwitchPort, lookup: Lookup::uuid(lsp.uuid) });
        self.store.transact(operations).await
    }

    /// Record which VM uses the port and ask OVN to bind it on `host_id`.
    pub async fn bind_port(&self, port_id: &str, vm_id: &str, host_id: &str) -> Result<(), NorthboundError> {
        let name = identity::switch_port_name(port_id);
        tracing::info!("binding port {name} to vm {vm_id} on host {host_id}");
        let lsp: LogicalSwitchPort = self.require(Lookup::name(&name)).await?;
        let lookup = Lookup::uuid(lsp.uuid);
        self.store.transact(vec![
            Operation::SetKeys {
                table: Table::LogicalSwitchPort,
                lookup: lookup.clone(),
                column: MapColumn::ExternalIds,
                entries: ExternalIds::from([(external_ids::VM_ID.to_string(), vm_id.to_string())]),
            },
            Operation::SetKeys {
                table: Table::LogicalSwitchPort,
                lookup,
                column: MapColumn::Options,
                entries: ExternalIds::from([("requested-chassis".to_string(), host_id.to_string())]),
            },
        ]).await
    }

    /// Connect a VLAN network's switch to the physical network, `vlan_id` 0 leaves the port
    /// untagged.
    pub async fn create_localnet_port(
        &self,
        network_id: &str,
        vlan_id: u32,
        physical_network: &str,
    ) -> Result<LogicalSwitchPort, NorthboundError> {
        let switch_name = identity::switch_name(network_id);
        let name = identity::localnet_port_name(&switch_name);
        tracing::info!("creating localnet port {name} on {physical_network} vlan {vlan_id}");
        if vlan_id > 4095 {
            return Err(NorthboundError::invalid(format!("vlan {vlan_id} is outside 0..=4095")));
        }
        let switch: LogicalSwitch = self.require_parent(&switch_name, &name).await?;

        let mut lsp = LogicalSwitchPort::new(self.ids.uuid(), name, LogicalSwitchPortType::Localnet);
        lsp.addresses = vec!["unknown".into()];
        lsp.enabled = Some(true);
        lsp.options.insert("network_name".into(), physical_network.to_string());
        lsp.external_ids = external_ids_from(&[(external_ids::NETWORK_ID, network_id)]);
        lsp.tag = u16::try_from(vlan_id).ok().filter(|tag| *tag > 0);

        self.store.transact(vec![
            Operation::Insert(lsp.clone().into()),
            Operation::AddRefs {
                table: Table::LogicalSwitch,
                lookup: Lookup::uuid(switch.uuid),
                column: RefColumn::Ports,
                uuids: vec![lsp.uuid.clone()],
            },
        ]).await?;
        Ok(lsp)
    }

    /// The name the node agent binds a VM interface to.
    pub fn get_ovn_port_name(&self, port_id: &str) -> String {
        identity::switch_port_name(port_id)
    }

    // DHCP

    pub async fn create_dhcp_options(&self, config: &DhcpOptionsConfig) -> Result<DhcpOptions, NorthboundError> {
        tracing::info!("creating DHCP options for {} with router {}", config.cidr, config.router);
        let server_mac = match &config.server_mac {
            Some(mac) => mac.clone(),
            None => self.ids.mac(),
        };
        let options = DhcpOptions {
            uuid: self.ids.uuid(),
            cidr: config.cidr.clone(),
            options: config.to_options(&server_mac),
            external_ids: config.external_ids.clone(),
        };
        self.store.transact(vec![Operation::Insert(options.clone().into())]).await?;
        Ok(options)
    }

    pub async fn get_dhcp_options(&self, uuid: &str) -> Result<DhcpOptions, NorthboundError> {
        self.require(Lookup::uuid(uuid)).await
    }

    pub async fn update_dhcp_options(&self, options: &DhcpOptions) -> Result<(), NorthboundError> {
        tracing::info!("updating DHCP options {}", options.uuid);
        self.store.transact(vec![Operation::Update(options.clone().into())]).await
    }

    pub async fn delete_dhcp_options(&self, uuid: &str) -> Result<(), NorthboundError> {
        tracing::info!("deleting DHCP options {uuid}");
        self.store.transact(vec![Operation::Delete { table: Table::DhcpOptions, lookup: Lookup::uuid(uuid) }]).await
    }

    // routers

    pub async fn create_logical_router(
        &self,
        router_id: &str,
        project_id: &str,
        distributed: bool,
    ) -> Result<LogicalRouter, NorthboundError> {
        let name = identity::router_name(router_id);
        tracing::info!("creating logical router {name}, distributed {distributed}");
        let mut router = LogicalRouter::new(self.ids.uuid(), name);
        router.external_ids = external_ids_from(&[
            (external_ids::ROUTER_ID, router_id),
            (external_ids::PROJECT_ID, project_id),
        ]);
        if distributed {
            // no chassis pins the router to a gateway, it runs on every chassis
            router.options.insert("chassis".into(), String::new());
        }
        self.store.transact(vec![Operation::Insert(router.clone().into())]).await?;
        Ok(router)
    }

    pub async fn get_logical_router(&self, router_id: &str) -> Result<LogicalRouter, NorthboundError> {
        self.require(Lookup::name(identity::router_name(router_id))).await
    }

    /// Delete the router along with its ports, NAT rules, routes and the switch side peers of its
    /// interfaces.
    pub async fn delete_logical_router(&self, router_id: &str) -> Result<(), NorthboundError> {
        let name = identity::router_name(router_id);
        tracing::info!("deleting logical router {name}");
        let Some(router) = self.fetch::<LogicalRouter>(Lookup::name(&name)).await? else {
            return Ok(());
        };
        let mut operations = Vec::new();
        for peer in self.find::<LogicalSwitchPort>(external_ids::ROUTER, &name).await? {
            operations.extend(self.switch_detach(&peer.uuid).await?);
            operations.push(Operation::Delete { table: Table::LogicalSwitchPort, lookup: Lookup::uuid(peer.uuid) });
        }
        let owned = [
            (Table::LogicalRouterPort, &router.ports),
            (Table::Nat, &router.nat),
            (Table::LogicalRouterStaticRoute, &router.static_routes),
        ];
        for (table, uuids) in owned {
            operations.extend(uuids.iter().map(|uuid| Operation::Delete { table, lookup: Lookup::uuid(uuid) }));
        }
        operations.push(Operation::Delete { table: Table::LogicalRouter, lookup: Lookup::uuid(router.uuid) });
        self.store.transact(operations).await
    }

    async fn switch_detach(&self, port_uuid: &str) -> Result<Vec<Operation>, NorthboundError> {
        Ok(self.list::<LogicalSwitch>().await?
            .into_iter()
            .filter(|switch| switch.ports.iter().any(|port| port == port_uuid))
            .map(|switch| Operation::RemoveRefs {
                table: Table::LogicalSwitch,
                lookup: Lookup::uuid(switch.uuid),
                column: RefColumn::Ports,
                uuids: vec![port_uuid.to_string()],
            })
            .collect())
    }

    /// Connect a network to a router. `gateway` is the router address on that network with its
    /// prefix length, e.g. `192.168.1.1/24`.
    pub async fn add_router_interface(
        &self,
        router_id: &str,
        network_id: &str,
        gateway: &str,
    ) -> Result<LogicalRouterPort, NorthboundError> {
        let router_name = identity::router_name(router_id);
        let switch_name = identity::switch_name(network_id);
        let name = identity::router_port_name(&router_name, &switch_name);
        tracing::info!("adding router interface {name} with gateway {gateway}");
        if !matches!(OvnIpAddr::parse(gateway)?, OvnIpAddr::Subnet { .. }) {
            return Err(NorthboundError::invalid(format!("router interface gateway {gateway} needs a prefix length")));
        }
        let router: LogicalRouter = self.require_parent(&router_name, &name).await?;
        let switch: LogicalSwitch = self.require_parent(&switch_name, &name).await?;

        let mut lrp = LogicalRouterPort::new(self.ids.uuid(), name.clone(), self.ids.mac(), vec![gateway.to_string()]);
        lrp.enabled = Some(true);
        lrp.external_ids = external_ids_from(&[
            (external_ids::NETWORK_ID, network_id),
            (external_ids::ROUTER, &router_name),
        ]);

        let mut peer = LogicalSwitchPort::new(
            self.ids.uuid(),
            identity::router_peer_port_name(&router_name, &switch_name),
            LogicalSwitchPortType::Router);
        peer.addresses = vec!["router".into()];
        peer.options.insert("router-port".into(), name);
        peer.external_ids = external_ids_from(&[
            (external_ids::NETWORK_ID, network_id),
            (external_ids::ROUTER, &router_name),
        ]);

        self.store.transact(vec![
            Operation::Insert(lrp.clone().into()),
            Operation::AddRefs {
                table: Table::LogicalRouter,
                lookup: Lookup::uuid(router.uuid),
                column: RefColumn::Ports,
                uuids: vec![lrp.uuid.clone()],
            },
            Operation::Insert(peer.clone().into()),
            Operation::AddRefs {
                table: Table::LogicalSwitch,
                lookup: Lookup::uuid(switch.uuid),
                column: RefColumn::Ports,
                uuids: vec![peer.uuid],
            },
        ]).await?;
        Ok(lrp)
    }

    pub async fn remove_router_interface(&self, router_id: &str, network_id: &str) -> Result<(), NorthboundError> {
        let router_name = identity::router_name(router_id);
        let switch_name = identity::switch_name(network_id);
        tracing::info!("removing router interface between {router_name} and {switch_name}");
        let mut operations = Vec::new();
        let lrp_name = identity::router_port_name(&router_name, &switch_name);
        if let Some(lrp) = self.fetch::<LogicalRouterPort>(Lookup::name(lrp_name)).await? {
            operations.push(Operation::RemoveRefs {
                table: Table::LogicalRouter,
                lookup: Lookup::name(&router_name),
                column: RefColumn::Ports,
                uuids: vec![lrp.uuid.clone()],
            });
            operations.push(Operation::Delete { table: Table::LogicalRouterPort, lookup: Lookup::uuid(lrp.uuid) });
        }
        let peer_name = identity::router_peer_port_name(&router_name, &switch_name);
        if let Some(peer) = self.fetch::<LogicalSwitchPort>(Lookup::name(peer_name)).await? {
            operations.push(Operation::RemoveRefs {
                table: Table::LogicalSwitch,
                lookup: Lookup::name(&switch_name),
                column: RefColumn::Ports,
                uuids: vec![peer.uuid.clone()],
            });
            operations.push(Operation::Delete { table: Table::LogicalSwitchPort, lookup: Lookup::uuid(peer.uuid) });
        }
        self.store.transact(operations).await
    }

    pub async fn add_static_route(
        &self,
        router_id: &str,
        ip_prefix: &str,
        nexthop: &str,
    ) -> Result<LogicalRouterStaticRoute, NorthboundError> {
        let router_name = identity::router_name(router_id);
        tracing::info!("adding route {ip_prefix} via {nexthop} to {router_name}");
        let router: LogicalRouter = self.require_parent(&router_name, ip_prefix).await?;
        let mut route = LogicalRouterStaticRoute::new(
            self.ids.uuid(), OvnIpAddr::parse(ip_prefix)?, OvnIpAddr::parse(nexthop)?)?;
        route.external_ids = external_ids_from(&[(external_ids::ROUTER, &router_name)]);
        self.store.transact(vec![
            Operation::Insert(route.clone().into()),
            Operation::AddRefs {
                table: Table::LogicalRouter,
                lookup: Lookup::uuid(router.uuid),
                column: RefColumn::StaticRoutes,
                uuids: vec![route.uuid.clone()],
            },
        ]).await?;
        Ok(route)
    }

    /// Remove every route for `ip_prefix` on the router.
    pub async fn delete_static_route(&self, router_id: &str, ip_prefix: &str) -> Result<(), NorthboundError> {
        let router_name = identity::router_name(router_id);
        let prefix = OvnIpAddr::parse(ip_prefix)?;
        tracing::info!("deleting route {prefix} from {router_name}");
        let Some(router) = self.fetch::<LogicalRouter>(Lookup::name(&router_name)).await? else {
            return Ok(());
        };
        let mut operations = Vec::new();
        for uuid in &router.static_routes {
            let route: Option<LogicalRouterStaticRoute> = self.fetch(Lookup::uuid(uuid)).await?;
            if route.map_or(false, |route| route.ip_prefix == prefix) {
                operations.push(Operation::RemoveRefs {
                    table: Table::LogicalRouter,
                    lookup: Lookup::uuid(&router.uuid),
                    column: RefColumn::StaticRoutes,
                    uuids: vec![uuid.clone()],
                });
                operations.push(Operation::Delete { table: Table::LogicalRouterStaticRoute, lookup: Lookup::uuid(uuid) });
            }
        }
        self.store.transact(operations).await
    }

    // security groups

    /// Compile the security group into ACLs and replace whatever was stored for it before. Ports
    /// already in the group and the address set contents are carried over.
    pub async fn create_security_group_acls(
        &self,
        sg: &SecurityGroup,
    ) -> Result<SecurityGroupTranslation, NorthboundError> {
        tracing::info!("creating ACLs for security group {} ({}) with {} rules", sg.id, sg.name, sg.rules.len());
        let mut translation = self.translator.translate_security_group(sg)?;

        let mut operations = Vec::new();
        if let Some(existing) = self.fetch::<PortGroup>(Lookup::name(&translation.port_group.name)).await? {
            tracing::debug!("replacing {} ACLs of {}", existing.acls.len(), existing.name);
            translation.port_group.ports = existing.ports.clone();
            operations.extend(Self::port_group_removal(existing));
        }
        if let Some(existing) = self.fetch::<AddressSet>(Lookup::name(&translation.address_set.name)).await? {
            translation.address_set.addresses = existing.addresses;
            operations.push(Operation::Delete { table: Table::AddressSet, lookup: Lookup::uuid(existing.uuid) });
        }
        operations.push(Operation::Insert(translation.address_set.clone().into()));
        operations.extend(translation.acls.iter().cloned().map(|acl| Operation::Insert(acl.into())));
        operations.push(Operation::Insert(translation.port_group.clone().into()));
        self.store.transact(operations).await?;
        Ok(translation)
    }

    /// The group's ACLs go first, the port group holds the only list of them.
    fn port_group_removal(group: PortGroup) -> Vec<Operation> {
        let mut operations: Vec<Operation> = group.acls.iter()
            .map(|uuid| Operation::Delete { table: Table::Acl, lookup: Lookup::uuid(uuid) })
            .collect();
        operations.push(Operation::Delete { table: Table::PortGroup, lookup: Lookup::uuid(group.uuid) });
        operations
    }

    /// Delete the port group with its ACLs, then the address set.
    pub async fn delete_security_group_acls(&self, sg_id: &str) -> Result<(), NorthboundError> {
        tracing::info!("deleting ACLs of security group {sg_id}");
        let mut operations = Vec::new();
        if let Some(group) = self.fetch::<PortGroup>(Lookup::name(identity::port_group_name(sg_id))).await? {
            operations.extend(Self::port_group_removal(group));
        }
        operations.push(Operation::Delete { table: Table::AddressSet, lookup: Lookup::name(identity::address_set_name(sg_id)) });
        self.store.transact(operations).await
    }

    pub async fn get_port_group(&self, sg_id: &str) -> Result<PortGroup, NorthboundError> {
        self.require(Lookup::name(identity::port_group_name(sg_id))).await
    }

    pub async fn get_address_set(&self, sg_id: &str) -> Result<AddressSet, NorthboundError> {
        self.require(Lookup::name(identity::address_set_name(sg_id))).await
    }

    pub async fn get_acl(&self, uuid: &str) -> Result<Acl, NorthboundError> {
        self.require(Lookup::uuid(uuid)).await
    }

    /// Every ACL stored for the security group, built in rules included.
    pub async fn get_security_group_acls(&self, sg_id: &str) -> Result<Vec<Acl>, NorthboundError> {
        self.find(external_ids::SG_ID, sg_id).await
    }

    /// Put the port into the security group's port group so its ACLs apply to it.
    pub async fn apply_security_group_to_port(&self, port_id: &str, sg_id: &str) -> Result<(), NorthboundError> {
        tracing::debug!("applying security group {sg_id} to port {port_id}");
        let group = self.get_port_group(sg_id).await?;
        let lsp = self.get_logical_switch_port(port_id).await?;
        if group.ports.contains(&lsp.uuid) {
            return Ok(());
        }
        self.store.transact(vec![Operation::AddRefs {
            table: Table::PortGroup,
            lookup: Lookup::uuid(group.uuid),
            column: RefColumn::Ports,
            uuids: vec![lsp.uuid],
        }]).await
    }

    pub async fn remove_security_group_from_port(&self, port_id: &str, sg_id: &str) -> Result<(), NorthboundError> {
        tracing::debug!("removing security group {sg_id} from port {port_id}");
        let lsp_name = identity::switch_port_name(port_id);
        let Some(lsp) = self.fetch::<LogicalSwitchPort>(Lookup::name(lsp_name)).await? else {
            return Ok(());
        };
        self.store.transact(vec![Operation::RemoveRefs {
            table: Table::PortGroup,
            lookup: Lookup::name(identity::port_group_name(sg_id)),
            column: RefColumn::Ports,
            uuids: vec![lsp.uuid],
        }]).await
    }

    /// Replace the addresses in the security group's address set.
    pub async fn update_address_set(&self, sg_id: &str, addresses: Vec<String>) -> Result<AddressSet, NorthboundError> {
        let mut address_set = self.get_address_set(sg_id).await?;
        for address in &addresses {
            OvnIpAddr::parse(address)?;
        }
        tracing::debug!("address set {} now holds {} addresses", address_set.name, addresses.len());
        address_set.addresses = addresses;
        self.store.transact(vec![Operation::Update(address_set.clone().into())]).await?;
        Ok(address_set)
    }

    // NAT

    async fn create_nat(&self, router_id: &str, mut nat: Nat) -> Result<Nat, NorthboundError> {
        let router_name = identity::router_name(router_id);
        let router: LogicalRouter = self.require_parent(&router_name, &nat.external_ip.to_string()).await?;
        nat.external_ids.insert(external_ids::ROUTER.to_string(), router_name);
        self.store.transact(vec![
            Operation::Insert(nat.clone().into()),
            Operation::AddRefs {
                table: Table::LogicalRouter,
                lookup: Lookup::uuid(router.uuid),
                column: RefColumn::Nat,
                uuids: vec![nat.uuid.clone()],
            },
        ]).await?;
        Ok(nat)
    }

    /// One to one NAT between a floating IP and a VM address.
    pub async fn create_floating_ip_nat(
        &self,
        router_id: &str,
        floating_ip: &str,
        internal_ip: &str,
    ) -> Result<Nat, NorthboundError> {
        tracing::info!("creating floating ip {floating_ip} for {internal_ip} on router {router_id}");
        let mut nat = Nat::new(self.ids.uuid(), OvnNatType::DnatSNat,
            OvnIpAddr::parse(floating_ip)?, OvnIpAddr::parse(internal_ip)?)?;
        nat.external_ids.insert(external_ids::FLOATING_IP.to_string(), floating_ip.to_string());
        self.create_nat(router_id, nat).await
    }

    pub async fn delete_floating_ip_nat(&self, floating_ip: &str) -> Result<(), NorthboundError> {
        tracing::info!("deleting floating ip {floating_ip}");
        let mut operations = Vec::new();
        for nat in self.find::<Nat>(external_ids::FLOATING_IP, floating_ip).await? {
            operations.extend(self.nat_removal(nat).await?);
        }
        self.store.transact(operations).await
    }

    /// Source NAT for outbound traffic of `logical_subnet`.
    pub async fn create_snat(
        &self,
        router_id: &str,
        external_ip: &str,
        logical_subnet: &str,
    ) -> Result<Nat, NorthboundError> {
        tracing::info!("creating snat of {logical_subnet} to {external_ip} on router {router_id}");
        let mut nat = Nat::new(self.ids.uuid(), OvnNatType::SNat,
            OvnIpAddr::parse(external_ip)?, OvnIpAddr::parse(logical_subnet)?)?;
        nat.external_ids.insert(external_ids::SNAT.to_string(), "true".to_string());
        self.create_nat(router_id, nat).await
    }

    pub async fn get_nat(&self, uuid: &str) -> Result<Nat, NorthboundError> {
        self.require(Lookup::uuid(uuid)).await
    }

    pub async fn delete_nat(&self, uuid: &str) -> Result<(), NorthboundError> {
        let Some(nat) = self.fetch::<Nat>(Lookup::uuid(uuid)).await? else {
            return Ok(());
        };
        let operations = self.nat_removal(nat).await?;
        self.store.transact(operations).await
    }

    async fn nat_removal(&self, nat: Nat) -> Result<Vec<Operation>, NorthboundError> {
        let routers: Vec<LogicalRouter> = match nat.router() {
            Some(name) => self.fetch::<LogicalRouter>(Lookup::name(name)).await?.into_iter().collect(),
            None => self.list::<LogicalRouter>().await?,
        };
        let mut operations: Vec<Operation> = routers.into_iter()
            .filter(|router| router.nat.contains(&nat.uuid))
            .map(|router| Operation::RemoveRefs {
                table: Table::LogicalRouter,
                lookup: Lookup::uuid(router.uuid),
                column: RefColumn::Nat,
                uuids: vec![nat.uuid.clone()],
            })
            .collect();
        operations.push(Operation::Delete { table: Table::Nat, lookup: Lookup::uuid(nat.uuid) });
        Ok(operations)
    }

    // load balancers

    fn load_balancer_row(&self, lb: &LoadBalancer, uuid: String) -> Result<OvnLoadBalancer, NorthboundError> {
        let vip = OvnIpAddr::parse(&lb.spec.vip)?;
        if matches!(vip, OvnIpAddr::Subnet { .. }) {
            return Err(NorthboundError::invalid(format!("load balancer vip {vip} must be an ip")));
        }
        let protocol = match lb.spec.protocol.trim().to_lowercase() {
            protocol if protocol.is_empty() => "tcp".to_string(),
            protocol => protocol,
        };
        let mut vips = BTreeMap::new();
        for listener in &lb.spec.listeners {
            let members: Vec<String> = lb.spec.members.iter()
                .filter(|member| member.listener_id.is_empty() || member.listener_id == listener.id)
                .map(|member| endpoint(&member.address, member.port))
                .collect();
            if !members.is_empty() {
                vips.insert(endpoint(&lb.spec.vip, listener.port), members.join(","));
            }
        }
        let mut row = OvnLoadBalancer::new(uuid, identity::load_balancer_name(&lb.id));
        row.vips = vips;
        row.protocol = Some(protocol);
        row.external_ids = external_ids_from(&[
            (external_ids::LB_ID, &lb.id),
            (external_ids::PROJECT_ID, &lb.project_id),
        ]);
        Ok(row)
    }

    /// One VIP per listener, backed by the members for that listener plus members without a
    /// listener.
    pub async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<OvnLoadBalancer, NorthboundError> {
        tracing::info!("creating load balancer {} ({}) on {}", lb.id, lb.name, lb.spec.vip);
        let row = self.load_balancer_row(lb, self.ids.uuid())?;
        self.store.transact(vec![Operation::Insert(row.clone().into())]).await?;
        Ok(row)
    }

    pub async fn get_load_balancer(&self, lb_id: &str) -> Result<OvnLoadBalancer, NorthboundError> {
        self.require(Lookup::name(identity::load_balancer_name(lb_id))).await
    }

    /// Rebuild the load balancer from scratch. The row keeps its uuid so switches and routers it
    /// is attached to still point at it.
    pub async fn update_load_balancer(&self, lb: &LoadBalancer) -> Result<OvnLoadBalancer, NorthboundError> {
        tracing::info!("updating load balancer {}", lb.id);
        match self.fetch::<OvnLoadBalancer>(Lookup::name(identity::load_balancer_name(&lb.id))).await? {
            Some(existing) => {
                let row = self.load_balancer_row(lb, existing.uuid)?;
                self.store.transact(vec![Operation::Update(row.clone().into())]).await?;
                Ok(row)
            }
            None => self.create_load_balancer(lb).await,
        }
    }

    pub async fn delete_load_balancer(&self, lb_id: &str) -> Result<(), NorthboundError> {
        tracing::info!("deleting load balancer {lb_id}");
        let Some(row) = self.fetch::<OvnLoadBalancer>(Lookup::name(identity::load_balancer_name(lb_id))).await? else {
            return Ok(());
        };
        let mut operations = Vec::new();
        for switch in self.list::<LogicalSwitch>().await? {
            if switch.load_balancers.contains(&row.uuid) {
                operations.push(lb_detach(Table::LogicalSwitch, switch.uuid, &row.uuid));
            }
        }
        for router in self.list::<LogicalRouter>().await? {
            if router.load_balancers.contains(&row.uuid) {
                operations.push(lb_detach(Table::LogicalRouter, router.uuid, &row.uuid));
            }
        }
        operations.push(Operation::Delete { table: Table::LoadBalancer, lookup: Lookup::uuid(row.uuid) });
        self.store.transact(operations).await
    }

    pub async fn assign_load_balancer_to_switch(&self, lb_id: &str, network_id: &str) -> Result<(), NorthboundError> {
        let switch = self.get_logical_switch(network_id).await?;
        tracing::info!("assigning load balancer {lb_id} to switch {}", switch.name);
        let row = self.get_load_balancer(lb_id).await?;
        if switch.load_balancers.contains(&row.uuid) {
            return Ok(());
        }
        self.store.transact(vec![lb_attach(Table::LogicalSwitch, switch.uuid, row.uuid)]).await
    }

    pub async fn assign_load_balancer_to_router(&self, lb_id: &str, router_id: &str) -> Result<(), NorthboundError> {
        let router = self.get_logical_router(router_id).await?;
        tracing::info!("assigning load balancer {lb_id} to router {}", router.name);
        let row = self.get_load_balancer(lb_id).await?;
        if router.load_balancers.contains(&row.uuid) {
            return Ok(());
        }
        self.store.transact(vec![lb_attach(Table::LogicalRouter, router.uuid, row.uuid)]).await
    }
}

fn lb_attach(table: Table, owner: String, lb_uuid: String) -> Operation {
    Operation::AddRefs {
        table,
        lookup: Lookup::uuid(owner),
        column: RefColumn::LoadBalancers,
        uuids: vec![lb_uuid],
    }
}

fn lb_detach(table: Table, owner: String, lb_uuid: &str) -> Operation {
    Operation::RemoveRefs {
        table,
        lookup: Lookup::uuid(owner),
        column: RefColumn::LoadBalancers,
        uuids: vec![lb_uuid.to_string()],
    }
}

/// `ip:port`, with the brackets IPv6 needs.
fn endpoint(address: &str, port: u16) -> String {
    if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use quantumnet_schemas::domain::load_balancer::{Listener, LoadBalancerSpec, Member};
    use quantumnet_schemas::domain::network::{DhcpConfig, IpAddressConfig, VirtualNetworkSpec, VlanConfig};
    use quantumnet_schemas::domain::port::{BindingProfile, FixedIp, PortSpec, PortStatus};
    use quantumnet_schemas::domain::security_group::{RuleAction, RuleDirection, SecurityGroupRule};
    use quantumnet_schemas::EXTERNAL_ID_PREFIX;
    use crate::ovn::identity::SequentialIdGenerator;
    use super::*;

    fn client() -> NorthboundClient {
        NorthboundClient::with_store(Arc::new(InMemoryStore::new()), Arc::new(SequentialIdGenerator::new()))
    }

    fn network(id: &str, dhcp: bool) -> VirtualNetwork {
        VirtualNetwork {
            id: id.into(),
            project_id: "prj-1".into(),
            name: "web".into(),
            spec: VirtualNetworkSpec {
                network_type: NetworkType::Overlay,
                vlan: None,
                ip_config: IpAddressConfig {
                    ipv4_subnet: "10.0.1.0/24".into(),
                    ipv4_gateway: "10.0.1.1".into(),
                    dhcp: DhcpConfig {
                        enabled: dhcp,
                        dns_servers: vec!["8.8.8.8".into(), "1.1.1.1".into()],
                        domain_name: "example.internal".into(),
                        ..Default::default()
                    },
                },
                mtu: 1442,
            },
        }
    }

    fn port(id: &str, network_id: &str) -> Port {
        Port {
            id: id.into(),
            network_id: network_id.into(),
            spec: PortSpec {
                mac_address: "FA:16:3E:00:00:01".into(),
                fixed_ips: vec![FixedIp { subnet_id: "s1".into(), ip_address: "10.0.1.10".into() }],
                security_group_ids: vec!["sg-1".into()],
                port_security_enabled: true,
                binding: BindingProfile::default(),
            },
            status: PortStatus { vm_id: "vm-1".into(), host_id: String::new() },
        }
    }

    fn security_group() -> SecurityGroup {
        SecurityGroup {
            id: "sg-1".into(),
            name: "web".into(),
            stateful: true,
            rules: vec![SecurityGroupRule {
                id: "r1".into(),
                direction: RuleDirection::Ingress,
                protocol: "tcp".into(),
                port_min: 443,
                port_max: 443,
                remote_ip_prefix: "0.0.0.0/0".into(),
                action: RuleAction::Allow,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_without_address() {
        let config = NorthboundConfig {
            address: String::new(),
            use_mock_on_failure: false,
            ..Default::default()
        };
        let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIdGenerator::new());
        let err = NorthboundClient::connect(&config, ids.clone()).await.err();
        assert!(matches!(err, Some(NorthboundError::Connection { .. })));

        let config = NorthboundConfig { use_mock_on_failure: true, ..config };
        let client = NorthboundClient::connect(&config, ids).await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.mode(), StoreBackend::InMemory);

        let created = client.create_logical_switch(&network("net-1", false)).await.unwrap();
        let fetched = client.get_logical_switch("net-1").await.unwrap();
        assert_eq!(created.switch, fetched);
        assert_eq!(fetched.name, "ls-net-1");
        client.close().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_switch_with_dhcp_and_ports() {
        let client = client();
        let creation = client.create_logical_switch(&network("net-1", true)).await.unwrap();
        assert_eq!(creation.switch.other_config["subnet"], "10.0.1.0/24");
        assert_eq!(creation.switch.other_config["mtu"], "1442");
        assert_eq!(creation.switch.external_ids["limiquantix-network-id"], "net-1");
        let dhcp = creation.dhcp_options.unwrap();
        assert_eq!(dhcp.options["lease_time"], "86400");
        assert_eq!(dhcp.options["dns_server"], "{8.8.8.8, 1.1.1.1}");
        assert_eq!(dhcp.options["domain_name"], "\"example.internal\"");
        assert_eq!(dhcp.options["server_mac"], "0a:00:00:00:00:01");
        assert_eq!(client.get_dhcp_options(&dhcp.uuid).await.unwrap(), dhcp);

        let lsp = client.create_logical_switch_port(&port("p1", "net-1")).await.unwrap();
        assert_eq!(lsp.name, client.get_ovn_port_name("p1"));
        assert_eq!(lsp.addresses, vec!["fa:16:3e:00:00:01 10.0.1.10".to_string()]);
        assert_eq!(lsp.port_security, lsp.addresses);
        assert_eq!(lsp.dhcpv4_options.as_deref(), Some(dhcp.uuid.as_str()));
        assert_eq!(client.get_logical_switch("net-1").await.unwrap().ports, vec![lsp.uuid.clone()]);

        client.bind_port("p1", "vm-2", "host-7").await.unwrap();
        let bound = client.get_logical_switch_port("p1").await.unwrap();
        assert_eq!(bound.external_ids["limiquantix-vm-id"], "vm-2");
        assert_eq!(bound.options["requested-chassis"], "host-7");

        client.delete_logical_switch("net-1").await.unwrap();
        assert!(client.get_logical_switch("net-1").await.unwrap_err().is_not_found());
        assert!(client.get_logical_switch_port("p1").await.unwrap_err().is_not_found());
        assert!(client.get_dhcp_options(&dhcp.uuid).await.unwrap_err().is_not_found());
        // deleting again is fine
        client.delete_logical_switch("net-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_dhcp_failure_keeps_switch() {
        let client = client();
        let mut net = network("net-2", true);
        net.spec.ip_config.ipv4_subnet.clear();
        let creation = client.create_logical_switch(&net).await.unwrap();
        assert!(creation.dhcp_options.is_none());
        assert!(matches!(creation.dhcp_error, Some(NorthboundError::InvalidInput { .. })));
        assert!(client.get_logical_switch("net-2").await.is_ok());
    }

    #[tokio::test]
    async fn test_port_needs_switch() {
        let client = client();
        let err = client.create_logical_switch_port(&port("p1", "missing")).await.unwrap_err();
        assert_eq!(err, NorthboundError::ParentNotFound { name: "lsp-p1".into(), parent: "ls-missing".into() });
        assert!(client.bind_port("p1", "vm", "host").await.unwrap_err().is_not_found());
        client.delete_logical_switch_port("p1").await.unwrap();
    }

    #[tokio::test]
    async fn test_localnet_port() {
        let client = client();
        let mut net = network("net-3", false);
        net.spec.network_type = NetworkType::Vlan;
        net.spec.vlan = Some(VlanConfig { vlan_id: 100, physical_network: "physnet1".into() });
        let creation = client.create_logical_switch(&net).await.unwrap();
        assert_eq!(creation.switch.other_config["vlan"], "100");

        let lsp = client.create_localnet_port("net-3", 100, "physnet1").await.unwrap();
        assert_eq!(lsp.name, "ls-net-3-localnet");
        assert_eq!(lsp.port_type, LogicalSwitchPortType::Localnet);
        assert_eq!(lsp.tag, Some(100));
        assert_eq!(lsp.addresses, vec!["unknown".to_string()]);
        assert_eq!(lsp.options["network_name"], "physnet1");
        assert!(client.create_localnet_port("net-3", 5000, "physnet1").await.is_err());
    }

    #[tokio::test]
    async fn test_security_group_lifecycle() {
        let client = client();
        client.create_logical_switch(&network("net-1", false)).await.unwrap();
        client.create_logical_switch_port(&port("p1", "net-1")).await.unwrap();

        let translation = client.create_security_group_acls(&security_group()).await.unwrap();
        assert_eq!(translation.acls.len(), 6);
        let group = client.get_port_group("sg-1").await.unwrap();
        assert_eq!(group.name, "pg_sg_sg_1");
        assert_eq!(group.acls.len(), 6);
        assert_eq!(client.get_security_group_acls("sg-1").await.unwrap().len(), 6);
        let user_acl = client.get_acl(&group.acls[4]).await.unwrap();
        assert_eq!(user_acl._match, "outport == @pg_sg_sg_1 && ip4 && tcp && tcp.dst == 443");

        client.apply_security_group_to_port("p1", "sg-1").await.unwrap();
        client.apply_security_group_to_port("p1", "sg-1").await.unwrap();
        let lsp = client.get_logical_switch_port("p1").await.unwrap();
        assert_eq!(client.get_port_group("sg-1").await.unwrap().ports, vec![lsp.uuid.clone()]);
        client.update_address_set("sg-1", vec!["10.0.1.10".into()]).await.unwrap();
        assert!(client.update_address_set("sg-1", vec!["bogus".into()]).await.is_err());

        // regenerating keeps members and replaces every ACL
        let mut sg = security_group();
        sg.rules.clear();
        client.create_security_group_acls(&sg).await.unwrap();
        let group = client.get_port_group("sg-1").await.unwrap();
        assert_eq!(group.ports, vec![lsp.uuid.clone()]);
        assert_eq!(group.acls.len(), 5);
        assert_eq!(client.get_security_group_acls("sg-1").await.unwrap().len(), 5);
        assert_eq!(client.get_address_set("sg-1").await.unwrap().addresses, vec!["10.0.1.10".to_string()]);

        client.remove_security_group_from_port("p1", "sg-1").await.unwrap();
        assert!(client.get_port_group("sg-1").await.unwrap().ports.is_empty());

        client.delete_security_group_acls("sg-1").await.unwrap();
        assert!(client.get_port_group("sg-1").await.unwrap_err().is_not_found());
        assert!(client.get_address_set("sg-1").await.unwrap_err().is_not_found());
        assert!(client.get_security_group_acls("sg-1").await.unwrap().is_empty());
        client.delete_security_group_acls("sg-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_security_group_rejected() {
        let client = client();
        let err = client.create_security_group_acls(&SecurityGroup::default()).await.unwrap_err();
        assert!(matches!(err, NorthboundError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_router_interfaces_routes_and_nat() {
        let client = client();
        client.create_logical_switch(&network("net-1", false)).await.unwrap();
        let router = client.create_logical_router("r1", "prj-1", true).await.unwrap();
        assert_eq!(router.name, "lr-r1");
        assert_eq!(router.options.get("chassis").map(String::as_str), Some(""));

        let lrp = client.add_router_interface("r1", "net-1", "10.0.1.1/24").await.unwrap();
        assert_eq!(lrp.name, "lr-r1-to-ls-net-1");
        assert!(client.add_router_interface("r1", "net-1", "10.0.1.1").await.is_err());
        assert!(matches!(client.add_router_interface("r9", "net-1", "10.0.1.1/24").await,
            Err(NorthboundError::ParentNotFound { .. })));
        let switch = client.get_logical_switch("net-1").await.unwrap();
        assert_eq!(switch.ports.len(), 1);

        let route = client.add_static_route("r1", "0.0.0.0/0", "192.168.0.1").await.unwrap();
        let floating = client.create_floating_ip_nat("r1", "203.0.113.10", "10.0.1.10").await.unwrap();
        let snat = client.create_snat("r1", "203.0.113.1", "10.0.1.0/24").await.unwrap();
        assert!(client.create_floating_ip_nat("r1", "203.0.113.0/24", "10.0.1.10").await.is_err());
        let router = client.get_logical_router("r1").await.unwrap();
        assert_eq!(router.ports, vec![lrp.uuid.clone()]);
        assert_eq!(router.static_routes, vec![route.uuid.clone()]);
        assert_eq!(router.nat.len(), 2);
        assert_eq!(client.get_nat(&snat.uuid).await.unwrap().router(), Some("lr-r1"));

        client.delete_floating_ip_nat("203.0.113.10").await.unwrap();
        assert!(client.get_nat(&floating.uuid).await.unwrap_err().is_not_found());
        client.delete_static_route("r1", "0.0.0.0/0").await.unwrap();
        let router = client.get_logical_router("r1").await.unwrap();
        assert_eq!(router.nat, vec![snat.uuid.clone()]);
        assert!(router.static_routes.is_empty());

        client.remove_router_interface("r1", "net-1").await.unwrap();
        assert!(client.get_logical_switch("net-1").await.unwrap().ports.is_empty());
        assert!(client.get_logical_router("r1").await.unwrap().ports.is_empty());

        client.add_router_interface("r1", "net-1", "10.0.1.1/24").await.unwrap();
        client.delete_logical_router("r1").await.unwrap();
        assert!(client.get_logical_router("r1").await.unwrap_err().is_not_found());
        assert!(client.get_logical_switch("net-1").await.unwrap().ports.is_empty());
        assert!(client.get_nat(&snat.uuid).await.unwrap_err().is_not_found());
        client.delete_nat(&snat.uuid).await.unwrap();
    }

    fn load_balancer() -> LoadBalancer {
        LoadBalancer {
            id: "lb1".into(),
            project_id: "prj-1".into(),
            name: "web".into(),
            spec: LoadBalancerSpec {
                vip: "10.0.0.100".into(),
                protocol: String::new(),
                listeners: vec![
                    Listener { id: "http".into(), port: 80 },
                    Listener { id: "https".into(), port: 443 },
                    Listener { id: "idle".into(), port: 8080 },
                ],
                members: vec![
                    Member { listener_id: String::new(), address: "10.0.1.10".into(), port: 8000 },
                    Member { listener_id: "https".into(), address: "10.0.1.11".into(), port: 8443 },
                ],
            },
        }
    }

    #[tokio::test]
    async fn test_load_balancer_lifecycle() {
        let client = client();
        let mut lb = load_balancer();
        let row = client.create_load_balancer(&lb).await.unwrap();
        assert_eq!(row.name, "lb-lb1");
        assert_eq!(row.protocol.as_deref(), Some("tcp"));
        assert_eq!(row.vips["10.0.0.100:80"], "10.0.1.10:8000");
        assert_eq!(row.vips["10.0.0.100:443"], "10.0.1.10:8000,10.0.1.11:8443");
        assert_eq!(row.vips["10.0.0.100:8080"], "10.0.1.10:8000");

        client.create_logical_switch(&network("net-1", false)).await.unwrap();
        client.create_logical_router("r1", "prj-1", false).await.unwrap();
        client.assign_load_balancer_to_switch("lb1", "net-1").await.unwrap();
        client.assign_load_balancer_to_router("lb1", "r1").await.unwrap();
        client.assign_load_balancer_to_switch("lb1", "net-1").await.unwrap();
        assert_eq!(client.get_logical_switch("net-1").await.unwrap().load_balancers, vec![row.uuid.clone()]);

        lb.spec.protocol = "UDP".into();
        lb.spec.members.truncate(1);
        let updated = client.update_load_balancer(&lb).await.unwrap();
        assert_eq!(updated.uuid, row.uuid);
        assert_eq!(updated.protocol.as_deref(), Some("udp"));
        assert_eq!(client.get_load_balancer("lb1").await.unwrap().vips["10.0.0.100:443"], "10.0.1.10:8000");

        client.delete_load_balancer("lb1").await.unwrap();
        assert!(client.get_load_balancer("lb1").await.unwrap_err().is_not_found());
        assert!(client.get_logical_switch("net-1").await.unwrap().load_balancers.is_empty());
        assert!(client.get_logical_router("r1").await.unwrap().load_balancers.is_empty());
        client.delete_load_balancer("lb1").await.unwrap();
    }

    #[test]
    fn test_endpoint_brackets_ipv6() {
        assert_eq!(endpoint("10.0.0.1", 80), "10.0.0.1:80");
        assert_eq!(endpoint("fd00::1", 80), "[fd00::1]:80");
    }

    #[tokio::test]
    async fn test_external_ids_are_namespaced() {
        let client = client();
        client.create_logical_switch(&network("net-1", true)).await.unwrap();
        client.create_logical_switch_port(&port("p1", "net-1")).await.unwrap();
        client.create_logical_router("r1", "prj-1", false).await.unwrap();
        client.add_router_interface("r1", "net-1", "10.0.1.1/24").await.unwrap();
        client.add_static_route("r1", "0.0.0.0/0", "10.0.1.254").await.unwrap();
        client.create_snat("r1", "203.0.113.1", "10.0.1.0/24").await.unwrap();
        client.create_security_group_acls(&security_group()).await.unwrap();
        client.create_load_balancer(&load_balancer()).await.unwrap();

        let mut rows = 0;
        for table in Table::ALL {
            for object in client.store.list(table).await.unwrap() {
                rows += 1;
                assert!(!object.external_ids().is_empty(), "{table} {} has no back reference", object.uuid());
                for key in object.external_ids().keys() {
                    assert!(key.starts_with(EXTERNAL_ID_PREFIX), "{table} key {key}");
                }
            }
        }
        assert!(rows > 10);
    }
}
