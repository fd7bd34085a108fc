use {
    cosmwasm_schema::cw_serde,
    std::fmt,
};

/// Where a new or moved node lands, relative to a reference node.
///
/// The sibling positions are accepted by both `add_sibling` and `move`; the
/// child positions only by `move` (and by the insertion entry points that
/// imply them). On a tree with an ordering directive only the sorted
/// positions are valid, and vice versa.
#[cw_serde]
#[derive(Copy, Eq)]
pub enum Position {
    FirstSibling,
    Left,
    Right,
    LastSibling,
    SortedSibling,
    FirstChild,
    LastChild,
    SortedChild,
}

impl Position {
    pub fn is_sibling(self) -> bool {
        !self.is_child()
    }

    pub fn is_child(self) -> bool {
        matches!(self, Self::FirstChild | Self::LastChild | Self::SortedChild)
    }

    pub fn is_sorted(self) -> bool {
        matches!(self, Self::SortedSibling | Self::SortedChild)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstSibling => "first-sibling",
            Self::Left => "left",
            Self::Right => "right",
            Self::LastSibling => "last-sibling",
            Self::SortedSibling => "sorted-sibling",
            Self::FirstChild => "first-child",
            Self::LastChild => "last-child",
            Self::SortedChild => "sorted-child",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
