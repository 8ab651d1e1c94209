pub mod agent;
pub mod errors;
pub mod models;
pub mod obs;
pub mod prompt_template;
pub mod protocol;
pub mod providers;
pub mod tools;
pub mod voice;
