//! # Knowledge Engine
//!
//! A knowledge base search and AI-augmentation engine.
//!
//! Knowledge Engine ingests documents (PDF, DOCX, TXT, HTML), extracts
//! and stores their text per tenant, serves tiered lexical search with
//! snippet highlighting and a TTL result cache, and augments AI chat
//! prompts with the most relevant knowledge before handing them to a
//! generative provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────────┐
//! │  Upload  │──▶│  Parse  │──▶│ KnowledgeStore │
//! └──────────┘   └─────────┘   └──────┬────────┘
//!                                     │
//!                    ┌────────────────┤
//!                    ▼                ▼
//!              ┌──────────┐    ┌───────────┐   ┌──────────┐
//!              │  Search  │◀──▶│   Cache   │   │ Augment  │──▶ AI provider
//!              └──────────┘    └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbe serve                              # start the HTTP API
//! kbe parse ./policy.pdf                 # extract text locally
//! kbe parse ./notes.dat --doc-type txt   # override type inference
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy with stable wire codes |
//! | [`parse`] | PDF, DOCX, TXT, and HTML text extraction |
//! | [`snippet`] | Query-centered snippet extraction |
//! | [`store`] | Knowledge store abstraction and in-memory adapter |
//! | [`search`] | Tiered lexical search and ranking |
//! | [`cache`] | TTL cache for search outcomes |
//! | [`provider`] | AI provider abstraction (OpenAI, Anthropic) |
//! | [`augment`] | Prompt augmentation and completion orchestration |
//! | [`ingest`] | Upload decoding, validation, and storage |
//! | [`server`] | JSON HTTP API |

pub mod augment;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod parse;
pub mod provider;
pub mod search;
pub mod server;
pub mod snippet;
pub mod store;
