fn main() {
    // The default storage location can be baked in at build time.
    println!("cargo:rerun-if-env-changed=SQLVAULT_DEFAULT_STORAGE_PATH");
}
