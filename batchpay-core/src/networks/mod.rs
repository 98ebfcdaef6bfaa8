//! Network definitions. Only EVM chains carry batched calls today.

pub mod evm;
