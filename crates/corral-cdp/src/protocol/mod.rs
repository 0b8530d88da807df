//! CDP protocol domain types.
//!
//! Only the domains the Corral engine drives are modeled: Target (contexts
//! and pages), Page (navigation and capture), Runtime (evaluation), Input
//! (keyboard and mouse), Network (cookies and headers), Emulation (viewport,
//! user agent, locale), DOM (file inputs), and Browser (version probe).

pub mod browser;
pub mod dom;
pub mod emulation;
pub mod input;
pub mod network;
pub mod page;
pub mod runtime;
pub mod target;
