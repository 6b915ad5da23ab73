#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceID(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LSN(pub u64);
pub const INITIAL_LSN: LSN = LSN(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestID(pub u32);

/// Upper bound on the number of operations in one update batch.
pub const MAX_UPDATE_OPS: usize = 128;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:33013";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Request flags carried by REPLACE, UPDATE and DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u32);

impl Flags {
    pub const RETURN_TUPLE: u32 = 0x01;
    pub const ADD: u32 = 0x02;
    pub const REPLACE: u32 = 0x04;
    pub const ALLOWED: u32 = Self::RETURN_TUPLE | Self::ADD | Self::REPLACE;

    pub fn is_valid(self) -> bool {
        self.0 & !Self::ALLOWED == 0 && !(self.add() && self.replace())
    }
    pub fn return_tuple(self) -> bool {
        self.0 & Self::RETURN_TUPLE != 0
    }
    /// Insert only: fail if the key already exists.
    pub fn add(self) -> bool {
        self.0 & Self::ADD != 0
    }
    /// Replace only: fail if the key is absent.
    pub fn replace(self) -> bool {
        self.0 & Self::REPLACE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        assert!(Flags(0).is_valid());
        assert!(Flags(Flags::RETURN_TUPLE | Flags::ADD).is_valid());
        assert!(!Flags(Flags::ADD | Flags::REPLACE).is_valid());
        assert!(!Flags(0x10).is_valid());
        let flags = Flags(Flags::RETURN_TUPLE | Flags::REPLACE);
        assert!(flags.return_tuple());
        assert!(flags.replace());
        assert!(!flags.add());
    }
}
