pub mod menu;
pub mod notification;
pub mod order;
pub mod ticket;
pub mod user;
