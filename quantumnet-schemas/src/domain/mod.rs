//! Records handed to the network core by the surrounding services. These are plain data; the
//! core never persists or authorises them, it only reads them to derive logical network objects.

pub mod security_group;
pub mod network;
pub mod port;
pub mod load_balancer;
