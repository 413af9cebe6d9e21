/* Prototype strings and qualified member names */

use log::debug;

use crate::dex::dex_file::DexFile;
use crate::dex::{clamp_count, read_u2, read_u4};

/// Stand-in for any name part that does not resolve
pub const UNRESOLVED: &str = "???";

/// Drops one trailing `;` from a type descriptor
pub fn strip_descriptor_end(descriptor: &str) -> &str
{
    descriptor.strip_suffix(';').unwrap_or(descriptor)
}

/// Wide types take two registers
pub fn is_wide(descriptor: &str) -> bool
{
    descriptor.starts_with('J') || descriptor.starts_with('D')
}

impl DexFile
{
    /// Parameter descriptors of a prototype, in order.
    ///
    /// Returns `None` when the prototype or its list offset is invalid. A type
    /// index that does not resolve ends the list early.
    pub fn parameter_types(&self, proto_idx: u32) -> Option<Vec<&str>>
    {
        let proto = self.get_proto(proto_idx)?;
        if proto.parameters_off == 0 {
            return Some(vec![]);
        }

        let bytes = self.bytes();
        let mut ix = proto.parameters_off as usize;
        let declared = read_u4(bytes, &mut ix).ok()?;
        let size = clamp_count(bytes, ix, declared, 2);
        if size < declared {
            debug!("proto #{} parameter list clamped from {} to {}", proto_idx, declared, size);
        }

        let mut params = Vec::with_capacity(size as usize);
        for _ in 0..size
        {
            let type_idx = match read_u2(bytes, &mut ix) {
                Ok(t) => t,
                Err(_) => break,
            };
            match self.type_descriptor(type_idx as u32) {
                Some(d) => params.push(d),
                None => {
                    debug!("proto #{} parameter type {} unresolved, truncating", proto_idx, type_idx);
                    break;
                }
            }
        }
        Some(params)
    }

    /// `"(<params>)<return>"`, absent when the return type does not resolve
    pub fn prototype(&self, proto_idx: u32) -> Option<String>
    {
        let proto = self.get_proto(proto_idx)?;
        let ret = self.type_descriptor(proto.return_type_idx)?;
        let params = self.parameter_types(proto_idx)?;
        Some(format!("({}){}", params.concat(), ret))
    }

    pub fn method_parameter_types(&self, method_idx: u32) -> Option<Vec<&str>>
    {
        let method = self.get_method(method_idx)?;
        self.parameter_types(method.proto_idx as u32)
    }

    pub fn method_prototype(&self, method_idx: u32) -> Option<String>
    {
        let method = self.get_method(method_idx)?;
        self.prototype(method.proto_idx as u32)
    }

    pub fn method_name(&self, method_idx: u32) -> Option<&str>
    {
        let method = self.get_method(method_idx)?;
        self.get_string(method.name_idx)
    }

    /// Descriptor of the class declaring the method
    pub fn method_class(&self, method_idx: u32) -> Option<&str>
    {
        let method = self.get_method(method_idx)?;
        self.type_descriptor(method.class_idx as u32)
    }

    /// `"<class-without-trailing-';'>.<name><prototype>"`. Never empty; any
    /// part that cannot be resolved becomes `???`.
    pub fn qualified_method_name(&self, method_idx: u32) -> String
    {
        let class = self.method_class(method_idx).map(strip_descriptor_end).unwrap_or(UNRESOLVED);
        let name = self.method_name(method_idx).unwrap_or(UNRESOLVED);
        let proto = self.method_prototype(method_idx);
        format!("{}.{}{}", class, name, proto.as_deref().unwrap_or(UNRESOLVED))
    }

    /// `"<class descriptor>-><field name> <type descriptor>"`
    pub fn field_name(&self, field_idx: u32) -> Option<String>
    {
        let field = self.get_field(field_idx)?;
        let class = self.type_descriptor(field.class_idx as u32).unwrap_or(UNRESOLVED);
        let name = self.get_string(field.name_idx).unwrap_or(UNRESOLVED);
        let ty = self.type_descriptor(field.type_idx as u32).unwrap_or(UNRESOLVED);
        Some(format!("{}->{} {}", class, name, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_one_semicolon()
    {
        assert_eq!(strip_descriptor_end("Lfoo/Bar;"), "Lfoo/Bar");
        assert_eq!(strip_descriptor_end("I"), "I");
        assert_eq!(strip_descriptor_end(""), "");
    }

    #[test]
    fn wide_types()
    {
        assert!(is_wide("J"));
        assert!(is_wide("D"));
        assert!(!is_wide("I"));
        assert!(!is_wide("[J"));
        assert!(!is_wide("Ljava/lang/Double;"));
    }
}
