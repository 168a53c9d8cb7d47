//! Whole-program fixtures: each `test_data/*.run` file holds the
//! expected output, a `---` separator, and the program source. The
//! program is compiled and executed and its output compared verbatim.

use datatest_stable::Utf8Path;

#[derive(thiserror::Error, Debug)]
#[error("program datatest failed at {0}")]
struct DatatestError(Box<Utf8Path>);

fn program_test(path: &Utf8Path, contents: String) -> datatest_stable::Result<()> {
    let Some((expected, source)) = contents.split_once("\n---\n") else {
        return Err(format!("{path} is missing the `---` separator").into());
    };

    let code = plzero::compile(source)?;
    let mut out = Vec::new();
    plzero::execute(&code, &mut out)?;
    let got = String::from_utf8(out)?;

    if got != expected {
        println!("Program test {path} failed:\n  expected {expected:?}\n  got      {got:?}");
        Err(DatatestError(Box::from(path)))?
    }
    Ok(())
}

datatest_stable::harness! {
    program_test, "test_data", r"^.*\.run$",
}
