//! # selfsign - Disposable Self-Signed Code Signing
//!
//! selfsign issues a self-signed code signing certificate, signs a set of
//! binaries with it, makes the certificate a local trust anchor so those
//! signatures are recognised, and then destroys the private key. It is built
//! entirely on rustcrypto libraries and never modifies the signed binaries:
//! signatures are detached `<file>.sig` sidecars.
//!
//! ## Pipeline
//!
//! ```text
//! Idle → AcquireCertificate → SignFiles → InstallCertificate → EraseKey → Done
//!                 └──────────→ Failed
//! ```
//!
//! - **Certificate store** ([`store`]): reuses `<subject>.crt`/`<subject>.key`
//!   from a per-user directory, generates them on first use, loads a
//!   user-supplied pair, or creates a one-time identity.
//! - **Signing backend** ([`backend`]): signs, inspects and removes sidecar
//!   signatures and installs certificates into the platform trust store.
//! - **Secure erasure** ([`erase`]): zeroizes the key in memory, then
//!   overwrites and unlinks one-time key files.
//! - **Orchestrator** ([`orchestrator`]): sequences the stages and records
//!   every per-file result and warning.
//!
//! Only certificate acquisition (and invalid configuration) ends a run early.
//!
//! ## Quick Start
//!
//! ### Signing files
//!
//! ```rust,no_run
//! use selfsign::commands::{execute, exit_code};
//! use selfsign::config::SigningConfig;
//!
//! let config = SigningConfig::builder()
//!     .patterns(vec!["target/release/*.exe".to_string()])
//!     .build();
//!
//! let mut progress: Vec<String> = Vec::new();
//! let result = execute(&config, &mut progress);
//! for line in &progress {
//!     println!("{line}");
//! }
//! match &result {
//!     Ok(report) => print!("{report}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! std::process::exit(exit_code(&result));
//! ```
//!
//! ### Running in the background
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use selfsign::backend::platform_backend;
//! use selfsign::orchestrator::SigningOrchestrator;
//! use selfsign::store::{AcquireMode, UserStoreLocation};
//! use selfsign::task::spawn_signing;
//!
//! # async fn run() -> selfsign::error::Result<()> {
//! let orchestrator = SigningOrchestrator::new(Arc::new(UserStoreLocation), platform_backend());
//! let mut task = spawn_signing(
//!     orchestrator,
//!     AcquireMode::OneTime,
//!     vec![PathBuf::from("app.exe")],
//! );
//! while let Some(line) = task.progress.recv().await {
//!     println!("{line}");
//! }
//! let outcome = task.join().await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```
//!
//! ### Generating a certificate directly
//!
//! ```rust,no_run
//! use selfsign::{
//!     cert::{Certificate, params::{CertificationRequestInfo, Validity}},
//!     key::KeyPair,
//! };
//!
//! # fn main() -> selfsign::error::Result<()> {
//! let key = KeyPair::generate_rsa(2048)?;
//! let info = CertificationRequestInfo::code_signing("My Builds", key.public_key());
//! let cert = Certificate::new_self_signed(&info, &key, Validity::for_years(3))?;
//! println!("{}", cert.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! Progress and warnings are emitted through `tracing`. The library does not
//! install a subscriber.

pub mod backend;
pub mod cert;
pub mod commands;
pub mod config;
pub mod erase;
pub mod error;
pub mod issuer;
pub mod key;
pub mod orchestrator;
pub mod pem_utils;
pub mod store;
pub mod targets;
pub mod task;
pub mod tbs_certificate;
