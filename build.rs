fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .bytes(["."])
        .compile_protos(&["proto/coord_service.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("protobuf compile error: {e}"));

    Ok(())
}
