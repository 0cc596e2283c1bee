//! Implementation of the `distrogen list` command.

use std::collections::BTreeMap;

use anyhow::Result;

use distrogen_lib::distro::registry;

use crate::output::{OutputFormat, print_heading, print_item, print_json};

/// List registered image types, optionally narrowed to one distribution or
/// architecture.
pub fn cmd_list(distro: Option<&str>, arch: Option<&str>, format: OutputFormat) -> Result<()> {
  let registry = registry();
  let distros = match distro {
    Some(name) => vec![registry.get_distro(name)?],
    None => registry
      .list_distros()
      .into_iter()
      .map(|name| registry.get_distro(name))
      .collect::<Result<Vec<_>, _>>()?,
  };

  let mut listing: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();
  for d in &distros {
    let arches = match arch {
      Some(name) => vec![d.get_arch(name)?],
      None => d
        .list_arches()
        .into_iter()
        .map(|name| d.get_arch(name))
        .collect::<Result<Vec<_>, _>>()?,
    };
    let entry = listing.entry(d.name()).or_default();
    for a in arches {
      entry.insert(a.name(), a.list_image_types());
    }
  }

  if format.is_json() {
    return print_json(&listing);
  }

  for (distro, arches) in &listing {
    for (arch, image_types) in arches {
      print_heading(&format!("{} / {}", distro, arch));
      for name in image_types {
        print_item(name);
      }
      println!();
    }
  }
  Ok(())
}
