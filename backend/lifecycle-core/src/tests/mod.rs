mod config;
mod lock;
mod process;
