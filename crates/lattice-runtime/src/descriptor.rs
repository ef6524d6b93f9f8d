//! Descriptor discovery
//!
//! A module lists its descriptor locations in the `Service-Component`
//! header, separated by commas or whitespace. A location's last path segment
//! may be a wildcard pattern. Parsing the files themselves is left to a
//! [`DescriptorParser`].

use crate::context::ModuleContext;
use lattice_core::constants::SERVICE_COMPONENT_HEADER;
use lattice_core::{ComponentMetadata, Error, ModuleInfo, Result};
use std::collections::HashSet;
use tracing::{debug, error, trace};

/// Turns raw descriptor bytes into component metadata
pub trait DescriptorParser: Send + Sync {
    fn parse(&self, module: &ModuleInfo, entry: &str, raw: &[u8]) -> Result<Vec<ComponentMetadata>>;
}

/// Split a descriptor location into its directory and file pattern
///
/// A location without a `/` lives in the module root. Blank locations have
/// nothing to split.
pub fn split_location(location: &str) -> Option<(&str, &str)> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    match location.rfind('/') {
        None => Some(("/", location)),
        Some(0) => Some(("/", &location[1..])),
        Some(index) => Some((&location[..index], &location[index + 1..])),
    }
}

/// Entries of the module matching `location`
pub fn find_descriptors(context: &dyn ModuleContext, location: &str) -> Vec<String> {
    match split_location(location) {
        Some((path, pattern)) => context.find_entries(path, pattern),
        None => Vec::new(),
    }
}

fn is_wildcard(location: &str) -> bool {
    location.contains('*')
}

/// Read and parse every descriptor the module declares
///
/// Entries reached through more than one location are loaded once. A
/// location that matches nothing, or an entry that cannot be read or parsed,
/// is logged and skipped.
///
/// # Errors
/// `InvalidDescriptor` if the module has no `Service-Component` header.
pub fn load_descriptors(
    context: &dyn ModuleContext,
    parser: &dyn DescriptorParser,
) -> Result<Vec<ComponentMetadata>> {
    let module = context.module();
    let header = context.header(SERVICE_COMPONENT_HEADER).ok_or_else(|| {
        Error::invalid_descriptor(
            module.label(),
            format!("{} header not found", SERVICE_COMPONENT_HEADER),
        )
    })?;

    let mut loaded = HashSet::new();
    let mut descriptors = Vec::new();

    let locations = header
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|location| !location.is_empty());

    for location in locations {
        let entries = find_descriptors(context, location);
        if entries.is_empty() {
            if is_wildcard(location) {
                trace!(module = %module, location, "Descriptor pattern matched nothing");
            } else {
                error!(module = %module, location, "Component descriptor entry not found");
            }
            continue;
        }

        for entry in entries {
            if !loaded.insert(entry.clone()) {
                debug!(module = %module, entry = %entry, "Descriptor already loaded");
                continue;
            }

            let raw = match context.read_entry(&entry) {
                Ok(raw) => raw,
                Err(e) => {
                    error!(
                        module = %module,
                        entry = %entry,
                        error = %e,
                        "Cannot read component descriptor"
                    );
                    continue;
                }
            };

            match parser.parse(module, &entry, &raw) {
                Ok(parsed) => {
                    debug!(
                        module = %module,
                        entry = %entry,
                        components = parsed.len(),
                        "Loaded component descriptor"
                    );
                    descriptors.extend(parsed);
                }
                Err(e) => {
                    error!(
                        module = %module,
                        entry = %entry,
                        error = %e,
                        "Cannot parse component descriptor"
                    );
                }
            }
        }
    }

    Ok(descriptors)
}
