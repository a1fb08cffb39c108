//
// Do not put code in `mod.rs`, but put in e.g. `core.rs`.
//

pub mod core;

pub use self::core::{ConversationDetail, Portal};
