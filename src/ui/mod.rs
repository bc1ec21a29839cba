//! Overlay presenters for the headless binary.

pub mod notifications;

pub use notifications::{LogPresenter, NotificationPresenter};
