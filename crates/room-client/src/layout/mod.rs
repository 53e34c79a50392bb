//! Participant grid layout.

pub mod engine;
pub mod pager;
pub mod viewport;

pub use engine::{
    compute_layout, GridLayout, LayoutDescriptor, Pagination, PinnedLayout,
};
pub use pager::Pager;
pub use viewport::ViewportClass;
