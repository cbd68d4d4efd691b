// Build script to compile GLSL shaders to SPIR-V
//
// The renderer loads the .spv files at runtime (paths in config.toml), so a
// missing glslc only means shaders have to be compiled by hand.

use std::path::Path;
use std::process::Command;

const SHADERS: [&str; 2] = ["shaders/quad.vert", "shaders/quad.frag"];

fn main() {
    for shader in SHADERS {
        println!("cargo:rerun-if-changed={}", shader);
        compile_shader(shader, &format!("{}.spv", shader));
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            println!(
                "cargo:warning=Failed to compile {}: exit code {:?}",
                input,
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}); compile manually:", e);
            println!("cargo:warning=  glslc {} -o {}", input, output);
        }
    }
}
