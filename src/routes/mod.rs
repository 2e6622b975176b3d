pub mod admin;
pub mod game;
pub mod health;
