//! UI-adjacent state that survives the rendering cut (spec §1): toast
//! notifications. Byte-level rendering itself is an external collaborator.

pub mod toast;
