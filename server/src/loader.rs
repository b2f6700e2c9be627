//! On-disk dataset and group-list loading.
//!
//! Both files are bincode-encoded. The dataset is mandatory and a load
//! failure is fatal to the process; the group file is optional and a
//! missing one yields an empty list. Invariants (valid member indices,
//! at most 32 groups) are checked here once so the rest of the process
//! reads the shared structures without further validation.

use log::{info, warn};
use shared::{Dataset, GroupList, MAX_GROUPS};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: String,
        source: bincode::Error,
    },
    #[error("group '{group}' references trajectory {member}, dataset has {count}")]
    BadMember {
        group: String,
        member: usize,
        count: usize,
    },
    #[error("{0} groups exceed the maximum of 32")]
    TooManyGroups(usize),
}

pub fn load_dataset(path: &Path) -> Result<Dataset, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let dataset: Dataset =
        bincode::deserialize_from(BufReader::new(file)).map_err(|source| LoadError::Decode {
            path: path.display().to_string(),
            source,
        })?;
    info!(
        "Loaded {} trajectories from {}",
        dataset.trajectories.len(),
        path.display()
    );
    Ok(dataset)
}

/// Loads group definitions. An absent or unreadable file is not an
/// error; the server then simply has nothing to render per group.
pub fn load_groups(path: Option<&Path>, dataset: &Dataset) -> Result<GroupList, LoadError> {
    let Some(path) = path else {
        return Ok(GroupList::default());
    };
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) => {
            warn!("No group file at {}: {error}", path.display());
            return Ok(GroupList::default());
        }
    };
    let list: GroupList =
        bincode::deserialize_from(BufReader::new(file)).map_err(|source| LoadError::Decode {
            path: path.display().to_string(),
            source,
        })?;
    if list.groups.len() > MAX_GROUPS {
        return Err(LoadError::TooManyGroups(list.groups.len()));
    }
    let count = dataset.trajectories.len();
    for group in &list.groups {
        for &member in &group.members {
            if member >= count {
                return Err(LoadError::BadMember {
                    group: group.name.clone(),
                    member,
                    count,
                });
            }
        }
    }
    info!("Loaded {} groups from {}", list.groups.len(), path.display());
    Ok(list)
}
