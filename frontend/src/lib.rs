pub mod config;
pub mod consent;
pub mod components {
    pub mod cookie_banner;
}
