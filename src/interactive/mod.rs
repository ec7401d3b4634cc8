//! Interactive passthrough - typing straight into the focused session

pub mod filter;
pub mod keys;
pub mod passthrough;
pub mod state;

pub use keys::{key_to_tmux, InputEvent, MouseInput, TmuxInput};
pub use passthrough::{Outgoing, Passthrough, PassthroughAction};
pub use state::{InteractiveState, ScrollBurst};
