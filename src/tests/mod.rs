
#[cfg(test)]
mod tests {
    use crate::dex::header::Header;
    use crate::dex::DexFile;
    use crate::tests::builder::DexBuilder;

    #[test]
    fn builder_lays_out_a_readable_container() {
        let mut b = DexBuilder::new();
        let t = b.type_id("Lcom/basic/Test;");
        let m = b.method("Lcom/basic/Test;", "run", "V", &["I"]);
        let built = b.build();

        let header = Header::read(&built.bytes).unwrap();
        assert_eq!(header.file_size as usize, built.bytes.len());
        assert_eq!(header.data_off, built.data_off);
        assert_eq!(header.data_off % 4, 0);

        let dex = DexFile::from_vec(built.bytes).unwrap();
        assert_eq!(dex.type_descriptor(t), Some("Lcom/basic/Test;"));
        assert_eq!(dex.qualified_method_name(m), "Lcom/basic/Test.run(I)V");
        assert_eq!(dex.method_count(), 1);
    }

    #[test]
    fn builder_reuses_strings_and_types() {
        let mut b = DexBuilder::new();
        let a = b.type_id("La;");
        assert_eq!(b.type_id("La;"), a);
        assert_eq!(b.string("La;"), 0);
        assert_eq!(b.strings.len(), 1);
    }
}
