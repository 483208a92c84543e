mod account;
mod channel;
mod settings;

pub use account::{Account, Client, ClientStatus, Credits, Role};
pub use channel::Channel;
pub use settings::PanelSettings;
