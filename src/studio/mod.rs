//! Sitecraft studio: the multi-tenant website builder back-end.
//!
//! ## Overview
//!
//! Users sign up, build websites out of pages, sections, and elements,
//! upload media, and publish digital business cards. Every authenticated
//! request is authorized by walking the ownership chain
//! website → page → section → element up to the caller's user id.
//! Mutations are pushed to the user's open editor tabs over a WebSocket.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Editor  │ ───────> │  server.rs  (axum Router, static editor shell)   │
//! │  shell   │ <─────── │    └─ api/  (handlers, AppState, ApiError)       │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ AuthUser extractor (auth.rs)           │
//!                       │         v                                        │
//!                       │  db.rs  (StudioDb via DbHandle::call)            │
//!                       │         │                                        │
//!                       │         ├─ storage.rs  (BlobStore trait)         │
//!                       │         ├─ ai/         (CompletionProvider)      │
//!                       │         v                                        │
//!                       │  events.rs  (StudioEvent broadcast, /ws loop)    │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | Row types, write payloads, and API views                |
//! | `render`   | HTML for published pages                                |
//! | `vcard`    | `.vcf` export and the public profile page               |
//! | `embedded` | `rust-embed` bundle of `ui/dist`                        |

pub mod ai;
pub mod api;
pub mod auth;
pub mod db;
pub mod embedded;
pub mod events;
pub mod models;
pub mod render;
pub mod server;
pub mod storage;
pub mod vcard;
