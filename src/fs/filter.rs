//! Visibility and presentation rules applied to merged listings

use std::cmp::Ordering;

use regex::Regex;
use tracing::warn;

use crate::model::{ExtractFolder, Meta, Object, OrderBy, OrderDirection};
use crate::path;

/// Whether `meta` hides entries when `path` is listed by this viewer
pub fn whether_hide(can_see_hides: bool, meta: Option<&Meta>, path: &str) -> bool {
    if can_see_hides {
        return false;
    }
    let meta = match meta {
        Some(meta) => meta,
        None => return false,
    };
    if meta.hide.trim().is_empty() {
        return false;
    }
    if !path::path_equal(&meta.path, path) && !meta.h_sub {
        return false;
    }
    true
}

/// Compile the newline-separated hide patterns. Blank lines are ignored and
/// invalid patterns are skipped with a warning. Spaces are part of a pattern.
fn hide_patterns(hide: &str) -> Vec<Regex> {
    hide.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match Regex::new(line) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("ignoring invalid hide pattern {:?}: {}", line, e);
                None
            }
        })
        .collect()
}

/// Drop every object whose name matches any of the policy's patterns
pub fn hide(objs: Vec<Object>, meta: &Meta) -> Vec<Object> {
    let patterns = hide_patterns(&meta.hide);
    objs.into_iter()
        .filter(|obj| !patterns.iter().any(|re| re.is_match(&obj.name)))
        .collect()
}

/// Append virtual entries whose names the physical listing lacks
pub fn merge_virtual(mut objs: Vec<Object>, virtual_objs: Vec<Object>) -> Vec<Object> {
    for v in virtual_objs {
        if !objs.iter().any(|o| o.name == v.name) {
            objs.push(v);
        }
    }
    objs
}

/// Stable sort by the configured key and direction
pub fn sort_objects(objs: &mut [Object], order_by: OrderBy, direction: OrderDirection) {
    objs.sort_by(|a, b| {
        let ord = match order_by {
            OrderBy::Name => a.name.cmp(&b.name),
            OrderBy::Size => a.size.cmp(&b.size),
            OrderBy::Modified => a.modified.cmp(&b.modified),
        };
        match direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        }
    });
}

/// Group folders before or after files, keeping relative order otherwise.
///
/// `Flatten` needs child listings and is handled by the caller.
pub fn group_folders(objs: &mut [Object], extract: ExtractFolder) {
    match extract {
        ExtractFolder::Front => objs.sort_by(|a, b| folder_rank(b).cmp(&folder_rank(a))),
        ExtractFolder::Back => objs.sort_by(|a, b| folder_rank(a).cmp(&folder_rank(b))),
        ExtractFolder::None | ExtractFolder::Flatten => {}
    }
}

fn folder_rank(obj: &Object) -> Ordering {
    if obj.is_folder {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}
