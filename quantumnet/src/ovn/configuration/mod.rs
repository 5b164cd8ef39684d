pub mod dhcp;
pub mod nat;
pub mod route;
