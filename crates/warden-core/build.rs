use std::io::Result;

fn main() -> Result<()> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }

    tonic_build::configure()
        .build_server(false)
        .compile_protos(&["proto/dropstream.proto"], &["proto/"])?;

    println!("cargo:rerun-if-changed=proto/dropstream.proto");

    Ok(())
}
