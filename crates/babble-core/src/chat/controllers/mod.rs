pub mod app_controller;

pub use app_controller::{BabbleApp, Blocker, ModalAction, Readiness};
