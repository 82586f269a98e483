use std::path::PathBuf;

fn build_glsl(path: &str, name: &str) {
    println!("cargo:rerun-if-changed={}", path);

    let src = PathBuf::from(path);
    if !src.exists() {
        println!("cargo:warning=Shader does not exist at {:?}", src);
        return;
    }
    let Ok(out_dir) = std::env::var("OUT_DIR") else {
        println!("cargo:warning=OUT_DIR not set, not compiling {}", path);
        return;
    };
    let target = PathBuf::from(out_dir).join(name);

    let output = std::process::Command::new("glslangValidator")
        .arg("-V")
        .arg(path)
        .arg("--target-env")
        .arg("vulkan1.3")
        .arg("-o")
        .arg(&target)
        .output();

    match output {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            println!(
                "cargo:warning=Failed to compile {}: {}",
                path,
                String::from_utf8_lossy(&output.stdout)
            );
        }
        //Only the Vulkan backend reads the SPIR-V files, the software device runs without them.
        Err(e) => println!(
            "cargo:warning=glslangValidator not available ({}), {} is not compiled",
            e, path
        ),
    }
}

fn main() {
    build_glsl("shaders/passthrough.vert", "passthrough.vert.spv");
    build_glsl("shaders/color.frag", "color.frag.spv");
}
