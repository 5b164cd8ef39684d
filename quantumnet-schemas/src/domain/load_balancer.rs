use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct LoadBalancer {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    pub spec: LoadBalancerSpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct LoadBalancerSpec {
    pub vip: String,
    /// tcp when empty
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Listener {
    pub id: String,
    pub port: u16,
}

/// A backend. An empty `listener_id` makes the member serve every listener.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Member {
    #[serde(default)]
    pub listener_id: String,
    pub address: String,
    pub port: u16,
}
