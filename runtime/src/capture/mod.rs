//! Response capture.
//!
//! The interesting data never appears in the DOM in full; it travels in the
//! host app's own background API responses. This module owns the three
//! pieces that recover it: page-side observers that copy matching response
//! bodies into page globals ([`observer`]), the polling bridge that reads
//! those globals from the controller ([`channel`]), and a network-log
//! fallback for responses the observers missed ([`netlog`]).

pub mod channel;
pub mod netlog;
pub mod observer;

/// URL fragment identifying list-search responses.
pub const SEARCH_URL_MARKER: &str = "mixed_people/search";

/// URL fragment identifying contact-unlock responses.
pub const UNLOCK_URL_MARKER: &str = "mixed_people/add_to_my_prospects";

/// The two page-side capture queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    /// Search responses, one entry per rendered page of results.
    Search,
    /// Unlock responses, one entry per disclosure call.
    Unlock,
}

impl Queue {
    /// Name of the page-global array backing this queue.
    pub fn js_array(self) -> &'static str {
        match self {
            Queue::Search => "window.__prospector_search_responses",
            Queue::Unlock => "window.__prospector_unlock_responses",
        }
    }

    /// URL fragment the observers route into this queue.
    pub fn url_marker(self) -> &'static str {
        match self {
            Queue::Search => SEARCH_URL_MARKER,
            Queue::Unlock => UNLOCK_URL_MARKER,
        }
    }
}
