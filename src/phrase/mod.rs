pub mod generator;
pub mod note;
pub mod scheduler;
pub mod tintinnabuli;
pub mod voice;
