use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use crate::errors::{Result, StorageError};
use crate::models::{Record, Value};
use crate::normalize::{FieldKind, NumericFallback, coerce};
use crate::utils::fingerprint::{fingerprint_line, strip_line_terminator};

/// How raw lines are cut into fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Byte ranges per field, values coerced to the declared column kind.
    FixedWidth,
    /// Delimiter separated, only the first `columns` fields are significant.
    /// Present values are coerced like fixed width ones, missing trailing columns are NULL.
    Delimited {
        delimiter: u8,
        columns: usize,
        skip_header: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// 0-indexed, end-exclusive byte range. Only used by fixed width layouts.
    pub span: (usize, usize),
}

const fn fixed(name: &'static str, kind: FieldKind, start: usize, end: usize) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        span: (start, end),
    }
}

const fn column(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        span: (0, 0),
    }
}

/// Everything the ingestion engine needs to know about one record shape.
#[derive(Debug)]
pub struct SchemaDescriptor {
    pub name: &'static str,
    pub default_table: &'static str,
    pub id_column: &'static str,
    pub natural_key: &'static str,
    pub layout: Layout,
    pub fields: &'static [FieldSpec],
}

impl SchemaDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn is_date_column(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.kind == FieldKind::Date)
    }

    /// Splits a whole source file into records. Blank lines and the header row
    /// of delimited sources are skipped.
    pub fn parse(&self, content: &[u8], fallback: NumericFallback) -> Vec<Record> {
        let skip = match self.layout {
            Layout::Delimited { skip_header: true, .. } => 1,
            _ => 0,
        };
        content
            .split_inclusive(|b| *b == b'\n')
            .skip(skip)
            .filter_map(|line| self.parse_line(line, fallback))
            .collect()
    }

    /// Parses one raw line, `None` for blank lines.
    pub fn parse_line(&self, line: &[u8], fallback: NumericFallback) -> Option<Record> {
        let raw = strip_line_terminator(line);
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }

        let fields: BTreeMap<String, Value> = match self.layout {
            Layout::FixedWidth => self
                .fields
                .iter()
                .map(|spec| {
                    let text = slice_field(raw, spec.span);
                    (spec.name.to_string(), coerce(&text, spec.kind, fallback))
                })
                .collect(),
            Layout::Delimited {
                delimiter, columns, ..
            } => {
                let decoded = decode_windows_1252(raw);
                let mut parts = decoded.split(delimiter as char);
                self.fields
                    .iter()
                    .take(columns)
                    .map(|spec| {
                        let value = parts
                            .next()
                            .map(|part| coerce(part, spec.kind, fallback))
                            .unwrap_or(Value::Null);
                        (spec.name.to_string(), value)
                    })
                    .collect()
            }
        };

        let natural_key = fields.get(self.natural_key).cloned().unwrap_or(Value::Null);
        Some(Record {
            fields,
            line_fingerprint: fingerprint_line(raw),
            natural_key,
        })
    }
}

fn slice_field(line: &[u8], (start, end): (usize, usize)) -> String {
    let end = end.min(line.len());
    if start >= end {
        return String::new();
    }
    String::from_utf8_lossy(&line[start..end]).into_owned()
}

/// Code points of bytes 0x80..=0x9F in Windows-1252. Undefined slots map to the C1 control.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// UCS exports are Windows-1252. Valid UTF-8 is passed through unchanged.
pub fn decode_windows_1252(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
            _ => b as char,
        })
        .collect()
}

use FieldKind::{Date, Flag, Float, Integer, Text};

const SATCAT_FIELDS: &[FieldSpec] = &[
    fixed("intl_desg", Text, 0, 11),
    fixed("norad_num", Integer, 13, 18),
    fixed("multiple_name_flag", Flag, 19, 20),
    fixed("payload_flag", Flag, 20, 21),
    fixed("ops_status_code", Text, 21, 22),
    fixed("name", Text, 23, 47),
    fixed("source", Text, 49, 54),
    fixed("launch_date", Date, 56, 66),
    fixed("launch_site", Text, 69, 73),
    fixed("decay_date", Date, 75, 85),
    fixed("orbit_period_minutes", Float, 87, 94),
    fixed("inclination_deg", Float, 96, 101),
    fixed("apogee", Integer, 103, 109),
    fixed("perigee", Integer, 111, 117),
    fixed("radar_crosssec", Float, 119, 127),
    fixed("orbit_status_code", Text, 129, 132),
];

/// Number of significant columns in the UCS export.
pub const UCS_COLUMNS: usize = 35;

const UCS_FIELDS: &[FieldSpec] = &[
    column("name", Text),
    column("country_registered", Text),
    column("country_owner", Text),
    column("owner_operator", Text),
    column("users", Text),
    column("purpose", Text),
    column("purpose_detailed", Text),
    column("orbit_class", Text),
    column("orbit_type", Text),
    column("geo_longitude", Float),
    column("perigee_km", Integer),
    column("apogee_km", Integer),
    column("eccentricity", Float),
    column("inclination_degrees", Float),
    column("period_minutes", Float),
    column("launch_mass_kg", Integer),
    column("dry_mass_kg", Text),
    column("power_watts", Text),
    column("launch_date", Date),
    column("expected_lifetime_years", Text),
    column("contractor", Text),
    column("contractor_country", Text),
    column("launch_site", Text),
    column("launch_vehicle", Text),
    column("international_designator", Text),
    column("norad_number", Integer),
    column("comments", Text),
    column("detailed_comments", Text),
    column("source_1", Text),
    column("source_2", Text),
    column("source_3", Text),
    column("source_4", Text),
    column("source_5", Text),
    column("source_6", Text),
    column("source_7", Text),
];

/// Celestrak SATCAT, fixed width text.
pub static SATCAT: SchemaDescriptor = SchemaDescriptor {
    name: "satcat",
    default_table: "celestrak_satcat",
    id_column: "satcat_id",
    natural_key: "norad_num",
    layout: Layout::FixedWidth,
    fields: SATCAT_FIELDS,
};

/// Union of Concerned Scientists satellite database, tab delimited.
pub static UCS: SchemaDescriptor = SchemaDescriptor {
    name: "ucs",
    default_table: "ucs_satdb",
    id_column: "satdb_id",
    natural_key: "norad_number",
    layout: Layout::Delimited {
        delimiter: b'\t',
        columns: UCS_COLUMNS,
        skip_header: true,
    },
    fields: UCS_FIELDS,
};

#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, &'static SchemaDescriptor>,
}

impl SchemaRegistry {
    fn builtin() -> Self {
        let schemas = [&SATCAT, &UCS]
            .into_iter()
            .map(|schema| (schema.name, schema))
            .collect();
        Self { schemas }
    }

    pub fn get(&self, name: &str) -> Option<&'static SchemaDescriptor> {
        self.schemas.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<&'static SchemaDescriptor> {
        self.get(name)
            .ok_or_else(|| StorageError::UnknownSchema(name.to_string()))
    }

    /// The schema whose default table is `table`.
    pub fn for_table(&self, table: &str) -> Option<&'static SchemaDescriptor> {
        self.schemas
            .values()
            .copied()
            .find(|schema| schema.default_table == table)
    }
}

pub static SCHEMA_REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::builtin);
