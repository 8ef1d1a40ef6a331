//! HMI (C6): OLED rendering and two-button input (spec §4.6).

pub mod display;
pub mod input;
pub mod menu;
