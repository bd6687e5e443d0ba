//! # single-similarity
//!
//! A specialized Rust library for Hilbert-curve similarity analysis of
//! high-dimensional single-cell data.
//!
//! The crate turns continuous multidimensional samples (e.g. mass cytometry
//! intensities) into positions on a space-filling curve and compares the
//! resulting population distributions between experimental conditions: an
//! information-theoretic similarity score per condition pair, and a
//! bootstrap significance test that flags the curve regions whose
//! population changed relative to a reference condition.
//!
//! ## Pipeline
//!
//! Raw samples are clamped and binned per dimension ([`binning`]),
//! dimensions are ordered by normalized mutual information so dependent
//! channels sit on neighboring curve axes ([`ordering`]), each point is
//! encoded to a single integer curve position ([`curve`]), and the
//! per-index population tables feed the similarity scores ([`similarity`])
//! and the resampling significance test ([`bootstrap`]). [`pipeline`] ties
//! the stages together under one explicit [`AnalysisConfig`].
//!
//! ## Module Organization
//!
//! - **[`config`]**: the analysis parameter object
//! - **[`binning`]**: quantile cuts with a minimum-count floor
//! - **[`ordering`]**: mutual-information dimension ordering
//! - **[`curve`]**: exact-integer Hilbert encode/decode
//! - **[`similarity`]**: count tables, Jensen-Shannon divergence, entropy
//! - **[`bootstrap`]**: per-index significance against a reference
//! - **[`pipeline`]**: end-to-end orchestration

pub mod binning;
pub mod bootstrap;
pub mod config;
pub mod curve;
pub mod ordering;
pub mod pipeline;
pub mod similarity;

pub use config::{AnalysisConfig, CutMode};
pub use pipeline::{AnalysisArtifacts, SimilarityPipeline};
