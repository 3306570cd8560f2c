//! Profile / include / exclude selection

use std::collections::BTreeSet;
use tracing::debug;

use crate::catalog::{Catalog, ServiceSpec};
use crate::{CatalogError, Result};

/// Profile used when a selection resolves to nothing
pub const FALLBACK_PROFILE: &str = "central-all";

/// Which services to deploy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Starting profile
    pub profile: Option<String>,
    /// Names added to the profile
    pub include: Vec<String>,
    /// Names removed afterwards
    pub exclude: Vec<String>,
}

impl Selection {
    /// Selection starting from a profile
    pub fn profile(name: impl Into<String>) -> Self {
        Self {
            profile: Some(name.into()),
            ..Default::default()
        }
    }

    /// Add services
    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(names.into_iter().map(Into::into));
        self
    }

    /// Remove services
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Resolve against a catalog: profile ∪ include − exclude, falling back to
    /// `central-all` when empty, sorted by name
    pub fn resolve(&self, catalog: &Catalog) -> Result<Vec<ServiceSpec>> {
        let known = |name: &str| -> Result<()> {
            if catalog.service(name).is_none() {
                return Err(CatalogError::UnknownService(name.to_string()));
            }
            Ok(())
        };

        let mut selected: BTreeSet<&str> = BTreeSet::new();
        if let Some(profile) = self.profile.as_deref().filter(|p| !p.is_empty()) {
            let names = catalog
                .profile(profile)
                .ok_or_else(|| CatalogError::UnknownProfile(profile.to_string()))?;
            selected.extend(names.iter().map(String::as_str));
        }
        for name in &self.include {
            known(name.as_str())?;
            selected.insert(name.as_str());
        }
        for name in &self.exclude {
            known(name.as_str())?;
            selected.remove(name.as_str());
        }

        if selected.is_empty() {
            debug!("Empty selection, falling back to {}", FALLBACK_PROFILE);
            let names = catalog
                .profile(FALLBACK_PROFILE)
                .ok_or_else(|| CatalogError::UnknownProfile(FALLBACK_PROFILE.to_string()))?;
            selected.extend(names.iter().map(String::as_str));
        }

        Ok(selected
            .into_iter()
            .filter_map(|name| catalog.service(name).cloned())
            .collect())
    }
}

/// Split a comma-separated flag value, trimming and dropping empty items
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// One `- name (role)` line per service
pub fn summarize_selection(specs: &[ServiceSpec]) -> String {
    specs
        .iter()
        .map(|s| format!("- {} ({})\n", s.name, s.role))
        .collect()
}
