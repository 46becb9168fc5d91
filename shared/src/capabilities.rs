//! Capabilities the core asks the shell to perform.
//!
//! Preferences go through the shell's key/value store. Quest writes run as
//! composed tasks against the injected repository, so they never leave the
//! core as effects.
pub use crux_core::compose::Compose;
pub use crux_core::render::Render;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub kv: KeyValue<Event>,
    pub render: Render<Event>,
    #[effect(skip)]
    pub compose: Compose<Event>,
}
