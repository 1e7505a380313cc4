//! Atom table
//!
//! Server-side interning of names. The 68 predefined atoms of the core
//! protocol occupy ids 1..=68; everything interned later follows in order.

use std::collections::HashMap;

use tracing::trace;
use x11rb::protocol::xproto::Atom;

/// Name of the RandR property that marks head-mounted and similar displays
pub const NON_DESKTOP: &str = "non-desktop";

const PREDEFINED: [&str; 68] = [
    "PRIMARY",
    "SECONDARY",
    "ARC",
    "ATOM",
    "BITMAP",
    "CARDINAL",
    "COLORMAP",
    "CURSOR",
    "CUT_BUFFER0",
    "CUT_BUFFER1",
    "CUT_BUFFER2",
    "CUT_BUFFER3",
    "CUT_BUFFER4",
    "CUT_BUFFER5",
    "CUT_BUFFER6",
    "CUT_BUFFER7",
    "DRAWABLE",
    "FONT",
    "INTEGER",
    "PIXMAP",
    "POINT",
    "RECTANGLE",
    "RESOURCE_MANAGER",
    "RGB_COLOR_MAP",
    "RGB_BEST_MAP",
    "RGB_BLUE_MAP",
    "RGB_DEFAULT_MAP",
    "RGB_GRAY_MAP",
    "RGB_GREEN_MAP",
    "RGB_RED_MAP",
    "STRING",
    "VISUALID",
    "WINDOW",
    "WM_COMMAND",
    "WM_HINTS",
    "WM_CLIENT_MACHINE",
    "WM_ICON_NAME",
    "WM_ICON_SIZE",
    "WM_NAME",
    "WM_NORMAL_HINTS",
    "WM_SIZE_HINTS",
    "WM_ZOOM_HINTS",
    "MIN_SPACE",
    "NORM_SPACE",
    "MAX_SPACE",
    "END_SPACE",
    "SUPERSCRIPT_X",
    "SUPERSCRIPT_Y",
    "SUBSCRIPT_X",
    "SUBSCRIPT_Y",
    "UNDERLINE_POSITION",
    "UNDERLINE_THICKNESS",
    "STRIKEOUT_ASCENT",
    "STRIKEOUT_DESCENT",
    "ITALIC_ANGLE",
    "X_HEIGHT",
    "QUAD_WIDTH",
    "WEIGHT",
    "POINT_SIZE",
    "RESOLUTION",
    "COPYRIGHT",
    "NOTICE",
    "FONT_NAME",
    "FAMILY_NAME",
    "FULL_NAME",
    "CAP_HEIGHT",
    "WM_CLASS",
    "WM_TRANSIENT_FOR",
];

/// Process-wide name ↔ atom mapping
#[derive(Debug)]
pub struct AtomTable {
    names: Vec<String>,
    by_name: HashMap<String, Atom>,
}

impl AtomTable {
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::with_capacity(PREDEFINED.len()),
            by_name: HashMap::with_capacity(PREDEFINED.len()),
        };
        for name in PREDEFINED {
            table.intern(name);
        }
        table
    }

    /// Return the atom for `name`, allocating a new one if needed
    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(&atom) = self.by_name.get(name) {
            return atom;
        }
        self.names.push(name.to_owned());
        let atom = self.names.len() as Atom;
        self.by_name.insert(name.to_owned(), atom);
        trace!("Interned atom {} = {}", name, atom);
        atom
    }

    /// Look up an existing atom without interning
    pub fn lookup(&self, name: &str) -> Option<Atom> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, atom: Atom) -> Option<&str> {
        let index = usize::try_from(atom).ok()?.checked_sub(1)?;
        self.names.get(index).map(String::as_str)
    }

    /// Whether `atom` names something interned (None is never valid)
    pub fn is_valid(&self, atom: Atom) -> bool {
        atom != 0 && (atom as usize) <= self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}
