pub mod add_store_command;

pub use add_store_command::AddStoreCommand;
