//! Network policy compiler and Northbound client for the platform's OVN based SDN.
//!
//! The [`ovn::translator`] module compiles security groups into ACLs and port groups, the
//! [`ovn::northbound`] module persists those and every other logical network object through a
//! [`ovn::northbound::NorthboundStore`], either a real Northbound database or an in memory
//! simulation of one.

pub mod ovn;
