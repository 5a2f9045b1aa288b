pub mod alphabet;
pub mod codec;
pub mod credential;
pub mod marshal;
