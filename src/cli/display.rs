use chrono::{TimeZone, Utc};
use prettytable::{row, Row};

use crate::api::paths::decode_attributes;
use crate::api::{Global, Path, TableInfo};
use crate::rib::attributes::as_path_to_string;
use crate::rib::PathAttributes;
use crate::utils::{format_time_as_elapsed, maybe_string, u32_to_dotted, EMPTY_VALUE};

use super::table::ToRow;

/// A path of a listed destination
pub struct PathRow<'a> {
    pub prefix: &'a str,
    pub path: &'a Path,
}

impl<'a> PathRow<'a> {
    pub fn new(prefix: &'a str, path: &'a Path) -> Self {
        Self { prefix, path }
    }

    fn age(&self) -> String {
        self.path
            .received_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(format_time_as_elapsed)
            .unwrap_or_else(|| String::from(EMPTY_VALUE))
    }
}

impl<'a> ToRow for PathRow<'a> {
    fn columns() -> Row {
        row![
            "",
            "Prefix",
            "Next Hop",
            "Source",
            "ID",
            "Age",
            "Origin",
            "Local Pref",
            "Metric",
            "AS Path",
            "Communities"
        ]
    }

    fn to_row(&self) -> Row {
        // Paths that came over the API already passed validation, anything
        // unexpected is shown as empty rather than failing the whole table
        let attributes = decode_attributes(&self.path.pattrs)
            .unwrap_or_else(|_| PathAttributes::default());
        row![
            if self.path.best { "*" } else { EMPTY_VALUE },
            self.prefix,
            maybe_string(attributes.next_hop().as_ref()),
            self.path.source.as_deref().unwrap_or(EMPTY_VALUE),
            self.path.identifier,
            self.age(),
            attributes.origin().to_string(),
            maybe_string(attributes.local_pref().as_ref()),
            maybe_string(attributes.multi_exit_disc().as_ref()),
            maybe_string(attributes.as_path().map(as_path_to_string).as_ref()),
            maybe_string(attributes.communities()),
        ]
    }
}

impl ToRow for TableInfo {
    fn columns() -> Row {
        row!["Family", "Destinations", "Paths"]
    }

    fn to_row(&self) -> Row {
        row![self.family, self.num_destination, self.num_path]
    }
}

impl ToRow for Global {
    fn columns() -> Row {
        row![
            "AS",
            "Router ID",
            "Listen Port",
            "Families",
            "Multipath",
            "Local Pref"
        ]
    }

    fn to_row(&self) -> Row {
        let families = self
            .families
            .iter()
            .map(|family| family.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        row![
            u32_to_dotted(self.asn, '.'),
            self.router_id,
            self.listen_port,
            families,
            self.use_multiple_paths,
            maybe_string(self.default_local_pref.as_ref()),
        ]
    }
}
