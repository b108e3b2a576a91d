pub mod port;
pub mod sfr;
pub mod usci;
