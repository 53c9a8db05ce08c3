//! In-memory working copy over a `dw_store::Store`, the command surface
//! front ends call, and the periodic auto-advance loop.

pub mod clients;
mod error;
pub mod query;
mod session;
pub mod ticker;

pub use error::{Applied, SessionError, SessionResult};
pub use query::{
    ClientOrder, ClientSummary, DemandFilter, StatusFilter, TextScope, WeekGroup, WeekView,
};
pub use session::Session;
pub use ticker::{run_auto_advance, TickerStats};
