pub mod command_slot;
pub mod fence;
