pub mod booking;
pub mod money;
pub mod provider;
pub mod review;
pub mod service;
pub mod session;
pub mod user;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use provider::{ApprovalStatus, Provider};
pub use review::Review;
pub use service::{Service, ServiceCategory};
pub use session::Session;
pub use user::{Role, User};
