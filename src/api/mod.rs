pub mod bumdes_endpoints;
pub mod endpoints;
pub mod events;
pub mod middleware;
pub mod rest;
pub mod security;
pub mod state;
