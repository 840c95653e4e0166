pub mod add_driver_command;
pub mod remove_driver_command;
pub mod update_driver_command;

pub use add_driver_command::AddDriverCommand;
pub use remove_driver_command::RemoveDriverCommand;
pub use update_driver_command::UpdateDriverCommand;
