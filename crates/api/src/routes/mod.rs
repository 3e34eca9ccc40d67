pub mod comfy;
pub mod health;
