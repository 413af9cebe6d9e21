/* Access flags and the host-facing method flag bitmask */

use bitflags::bitflags;
use serde::{Serialize, Serializer};

pub const NO_INDEX: u32 = 0xffffffff;

pub const ACC_PUBLIC: u32 = 0x1;
pub const ACC_PRIVATE: u32 = 0x2;
pub const ACC_PROTECTED: u32 = 0x4;
pub const ACC_STATIC: u32 = 0x8;
pub const ACC_FINAL: u32 = 0x10;
pub const ACC_SYNCHRONIZED: u32 = 0x20;
pub const ACC_BRIDGE: u32 = 0x40;
pub const ACC_VARARGS: u32 = 0x80;
pub const ACC_NATIVE: u32 = 0x100;
pub const ACC_INTERFACE: u32 = 0x200;
pub const ACC_ABSTRACT: u32 = 0x400;
pub const ACC_STRICT: u32 = 0x800;
pub const ACC_SYNTHETIC: u32 = 0x1000;
pub const ACC_MIRANDA: u32 = 0x8000;
pub const ACC_CONSTRUCTOR: u32 = 0x10000;
pub const ACC_DECLARED_SYNCHRONIZED: u32 = 0x20000;

bitflags! {
    /// Method flags as reported to the host, one bit per DEX access flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        const PUBLIC = 1 << 0;
        const PRIVATE = 1 << 1;
        const PROTECTED = 1 << 2;
        const STATIC = 1 << 3;
        const FINAL = 1 << 4;
        const SYNCHRONIZED = 1 << 5;
        const BRIDGE = 1 << 6;
        const VARARGS = 1 << 7;
        const NATIVE = 1 << 8;
        const ABSTRACT = 1 << 9;
        const STRICT = 1 << 10;
        const SYNTHETIC = 1 << 11;
        const MIRANDA = 1 << 12;
        const CONSTRUCTOR = 1 << 13;
        const DECLARED_SYNCHRONIZED = 1 << 14;
    }
}

const ACCESS_TO_METHOD_FLAGS: [(u32, MethodFlags); 15] = [
    (ACC_PUBLIC, MethodFlags::PUBLIC),
    (ACC_PRIVATE, MethodFlags::PRIVATE),
    (ACC_PROTECTED, MethodFlags::PROTECTED),
    (ACC_STATIC, MethodFlags::STATIC),
    (ACC_FINAL, MethodFlags::FINAL),
    (ACC_SYNCHRONIZED, MethodFlags::SYNCHRONIZED),
    (ACC_BRIDGE, MethodFlags::BRIDGE),
    (ACC_VARARGS, MethodFlags::VARARGS),
    (ACC_NATIVE, MethodFlags::NATIVE),
    (ACC_ABSTRACT, MethodFlags::ABSTRACT),
    (ACC_STRICT, MethodFlags::STRICT),
    (ACC_SYNTHETIC, MethodFlags::SYNTHETIC),
    (ACC_MIRANDA, MethodFlags::MIRANDA),
    (ACC_CONSTRUCTOR, MethodFlags::CONSTRUCTOR),
    (ACC_DECLARED_SYNCHRONIZED, MethodFlags::DECLARED_SYNCHRONIZED),
];

impl MethodFlags
{
    pub fn from_access(access_flags: u32) -> MethodFlags
    {
        ACCESS_TO_METHOD_FLAGS
            .iter()
            .filter(|(acc, _)| access_flags & acc != 0)
            .fold(MethodFlags::empty(), |flags, (_, f)| flags | *f)
    }
}

impl Serialize for MethodFlags
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        serializer.serialize_u32(self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_access_bit()
    {
        for (acc, flag) in ACCESS_TO_METHOD_FLAGS {
            assert_eq!(MethodFlags::from_access(acc), flag);
        }
    }

    #[test]
    fn ignores_class_only_bits()
    {
        let f = MethodFlags::from_access(ACC_PUBLIC | ACC_STATIC | ACC_INTERFACE);
        assert_eq!(f, MethodFlags::PUBLIC | MethodFlags::STATIC);
        assert!(MethodFlags::from_access(0).is_empty());
    }
}
