/// Data organization utilities for the reservoir chart service.
///
/// This module turns the flat, time-ordered rows yielded by a source into
/// per-reservoir structures. Chart construction lives in `chart`; this
/// module knows nothing about axes or presentation.
///
/// Submodules:
/// - `groupings`: partitions rows by reservoir into index-aligned series.

pub mod groupings;
