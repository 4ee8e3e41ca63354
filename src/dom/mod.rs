//! Document model: arena tree, HTML parsing, selectors and events

pub mod events;
pub mod html;
pub mod node;
pub mod selector;

pub use events::{Event, EventDispatcher, EventHandler, NON_BUBBLING, VIEW_CHANGED};
pub use html::{HtmlParser, inner_html, outer_html, parse_page, set_inner_html};
pub use node::{Document, ElementData, NodeId, NodeType, SharedDocument};
pub use selector::{Selector, query_selector};
