// Build script to compile GLSL shaders to SPIR-V
//
// Output lands next to the sources (shaders/<name>.spv), which is where the
// engine looks by default. A missing or failing glslc only warns: the engine
// logs the missing module at runtime and skips that material.

use std::path::Path;
use std::process::Command;

const SHADERS: [&str; 3] = ["mesh.vert", "default_lit.frag", "textured_lit.frag"];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for shader in SHADERS {
        let input = format!("shaders/{}", shader);
        let output = format!("shaders/{}.spv", shader);
        compile_shader(&input, &output);
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // Check if glslc is available
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
            println!("cargo:warning=glslc not found ({}), {} not compiled", e, input);
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}", input, output);
        }
    }
}
