pub mod instruments;
pub mod kite;
pub mod session;

pub use instruments::InstrumentResolver;
pub use kite::KiteClient;
pub use session::{ConfigSessionProvider, Session, SessionProvider};
