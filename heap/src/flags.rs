/// Per-cell flag byte shared between the collector and the object model.
///
/// The collector owns [`CellFlags::MARKED`]; every other bit belongs to the
/// cell type and survives collection untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
#[repr(transparent)]
pub struct CellFlags(pub u8);

impl CellFlags {
    pub const NONE: Self = Self(0);
    pub const MARKED: Self = Self(1 << 0);
    pub const IMMUTABLE: Self = Self(1 << 1);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline(always)]
    pub const fn without(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_and_without_are_independent() {
        let flags = CellFlags::NONE
            .with(CellFlags::MARKED)
            .with(CellFlags::IMMUTABLE);
        assert!(flags.contains(CellFlags::MARKED));
        let flags = flags.without(CellFlags::MARKED);
        assert!(!flags.contains(CellFlags::MARKED));
        assert!(flags.contains(CellFlags::IMMUTABLE));
    }
}
