pub mod notifier;
pub mod outcome;
pub mod raid;
pub mod raid_engine;
pub mod registry;
pub mod validation;
