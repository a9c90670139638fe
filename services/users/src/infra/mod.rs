pub mod broker;
pub mod db;
pub mod jwt;
pub mod mail;
pub mod memory;
pub mod password;
pub mod store;
