pub mod culture;
pub mod file_formats;
pub mod kinds;
pub mod reference;
pub mod settings;
pub mod standard;
