pub mod configuration;
pub mod plan;
pub mod upgrade;
pub mod versions;
