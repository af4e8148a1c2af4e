pub mod eligibility;
pub mod events;
pub mod extract;
pub mod notify;
pub mod parser;
pub mod report;
pub mod scraper;
pub mod session;
pub mod types;

pub use events::{EventSink, ProgressEvent};
pub use scraper::{Credentials, PortalScraper, ScrapeError};
pub use session::{HttpSession, PortalConfig};

pub const BASE_URL: &str = "https://portal.aiub.edu";
