pub mod rule;
pub mod settings;

pub use rule::{Placement, Rule, ShowState};
pub use settings::Settings;
