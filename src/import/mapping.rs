//! Sheet to table mapping
//!
//! Each workbook sheet maps to exactly one relation. Everything the populator needs to
//! know about a sheet lives in [`SHEET_SPECS`]; adding a sheet means adding an entry,
//! not a branch.

/// Per-sheet import rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetSpec {
    /// Sheet name in the workbook
    pub sheet: &'static str,
    /// Physical table name
    pub table: &'static str,
    /// Column renames applied before insert, `(source, target)`
    pub renames: &'static [(&'static str, &'static str)],
    /// Columns removed before insert (database-generated keys)
    pub stripped: &'static [&'static str],
    /// Columns that must be present and non-null
    pub required: &'static [&'static str],
    /// Sheets whose rows must be loaded first
    pub parents: &'static [&'static str],
}

impl SheetSpec {
    /// Look up a sheet by its workbook name (exact match)
    pub fn for_sheet(sheet: &str) -> Option<&'static SheetSpec> {
        SHEET_SPECS.iter().find(|spec| spec.sheet == sheet)
    }

    /// Look up a sheet by sheet or table name, ignoring case
    pub fn find(name: &str) -> Option<&'static SheetSpec> {
        let name = name.trim();
        SHEET_SPECS.iter().find(|spec| {
            spec.sheet.eq_ignore_ascii_case(name) || spec.table.eq_ignore_ascii_case(name)
        })
    }
}

/// Sheets in canonical workbook order
pub static SHEET_SPECS: &[SheetSpec] = &[
    SheetSpec {
        sheet: "Client",
        table: "client",
        renames: &[],
        stripped: &[],
        required: &[],
        parents: &[],
    },
    SheetSpec {
        sheet: "Transaction",
        table: "transaction",
        renames: &[("date_returned", "returned_date")],
        stripped: &["transaction_id"],
        required: &[],
        // Listed before MediaItem in the workbook, but its item_id references
        // media_item, so import_order moves it after MediaItem
        parents: &["Client", "MediaItem"],
    },
    SheetSpec {
        sheet: "MediaItem",
        table: "media_item",
        renames: &[],
        stripped: &[],
        required: &[],
        parents: &[],
    },
    SheetSpec {
        sheet: "Book",
        table: "book",
        renames: &[],
        stripped: &[],
        required: &["item_id"],
        parents: &["MediaItem"],
    },
    SheetSpec {
        sheet: "Magazine",
        table: "magazine",
        renames: &[],
        stripped: &[],
        required: &["item_id"],
        parents: &["MediaItem"],
    },
    SheetSpec {
        sheet: "DigitalMedia",
        table: "digital_media",
        renames: &[],
        stripped: &[],
        required: &["item_id"],
        parents: &["MediaItem"],
    },
];

/// Sheets in load order: parents first, otherwise canonical order
///
/// A sheet is emitted as soon as all of its parents have been emitted, always
/// picking the earliest remaining sheet in [`SHEET_SPECS`]. Parents that are not
/// listed are ignored; a cycle falls back to canonical order for the remainder.
pub fn import_order() -> Vec<&'static SheetSpec> {
    let mut remaining: Vec<&'static SheetSpec> = SHEET_SPECS.iter().collect();
    let mut ordered: Vec<&'static SheetSpec> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().position(|spec| {
            spec.parents.iter().all(|parent| {
                SheetSpec::for_sheet(parent).is_none()
                    || ordered.iter().any(|done| done.sheet == *parent)
            })
        });

        match ready {
            Some(index) => ordered.push(remaining.remove(index)),
            None => {
                tracing::warn!("Cyclic sheet dependencies, loading remaining sheets in listed order");
                ordered.append(&mut remaining);
            }
        }
    }

    ordered
}
