// SPDX-License-Identifier: GPL-3.0-or-later
pub mod normalize;
pub mod resolver;

pub use normalize::{build_query, normalize, normalize_field, primary_artist, ArtistStrategy};
pub use resolver::{CatalogResolver, Pacing, ResolverSettings, RunSummary};
