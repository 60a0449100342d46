//! Batch driver: runs every manifest entry through the extraction and
//! reassembly pipeline, one kernel at a time.
//!
//! Per kernel the driver walks `Start → MacroStripped → Located → Extracted →
//! Transformed → Synthesized → Compiled → Timed → Done`. Locator and tool
//! failures end the kernel early as a skipped outcome; only setup-level
//! problems (macro stripping, unreadable files, an unwritable scratch slot)
//! abort the run.

use crate::config::HarnessConfig;
use crate::layout::WorkspaceLayout;
use crate::manifest::{Manifest, ManifestEntry};
use crate::report::{
    BatchReport, BatchTally, FailureStage, KernelOutcome, KernelRecord, KernelTimings,
};
use anyhow::{Context, Result};
use polyprep_source::{
    extract, BodyVariant, BoundaryLocator, DirectiveFilter, LineListing, LineScanLocator,
    LocateError, SpliceContext, Synthesizer,
};
use polyprep_tools::{CompileRequest, Execution, Toolchain, ToolFailure, TransformError, Transformer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KernelStage {
    Start,
    MacroStripped,
    Located,
    Extracted,
    Transformed,
    Synthesized,
    Compiled,
    Timed,
    Done,
}

/// Outcome of one kernel together with the last stage it reached.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelRun {
    pub outcome: KernelOutcome,
    pub stage: KernelStage,
}

struct StageTracker<'a> {
    kernel: &'a str,
    stage: KernelStage,
}

impl<'a> StageTracker<'a> {
    fn new(kernel: &'a str) -> Self {
        Self {
            kernel,
            stage: KernelStage::Start,
        }
    }

    fn advance(&mut self, next: KernelStage) {
        debug_assert!(next > self.stage);
        debug!(kernel = self.kernel, from = ?self.stage, to = ?next, "kernel stage");
        self.stage = next;
    }

    fn finish(&self, outcome: KernelOutcome) -> KernelRun {
        KernelRun {
            outcome,
            stage: self.stage,
        }
    }

    fn locator_failure(&self, err: LocateError) -> KernelRun {
        self.finish(KernelOutcome::SkippedLocatorFailure {
            reason: err.to_string(),
        })
    }

    fn tool_failure(&self, stage: FailureStage, failure: ToolFailure) -> KernelRun {
        self.finish(KernelOutcome::SkippedToolFailure { stage, failure })
    }
}

/// Drives a batch. Holds the only mutable state that spans kernels: the tally.
///
/// The transformer owns a single scratch slot, so kernels are processed
/// strictly in sequence.
pub struct BatchDriver<T, C> {
    layout: WorkspaceLayout,
    locator: Box<dyn BoundaryLocator>,
    filter: DirectiveFilter,
    synthesizer: Synthesizer,
    function_prefix: String,
    transformer: T,
    toolchain: C,
    tally: BatchTally,
}

impl<T, C> BatchDriver<T, C>
where
    T: Transformer,
    C: Toolchain,
{
    pub fn new(config: &HarnessConfig, layout: WorkspaceLayout, transformer: T, toolchain: C) -> Self {
        Self {
            layout,
            locator: Box::new(LineScanLocator::new()),
            filter: DirectiveFilter::new(config.locator.directive_marker.as_str()),
            synthesizer: Synthesizer::new(config.locator.closing_brace),
            function_prefix: config.locator.function_prefix.clone(),
            transformer,
            toolchain,
            tally: BatchTally::default(),
        }
    }

    /// Substitute the boundary search strategy.
    pub fn with_locator<L>(mut self, locator: L) -> Self
    where
        L: BoundaryLocator + 'static,
    {
        self.locator = Box::new(locator);
        self
    }

    pub fn tally(&self) -> BatchTally {
        self.tally
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Process every entry, printing progress and a final summary line.
    pub fn run(&mut self, manifest: &Manifest) -> Result<BatchReport> {
        let total = manifest.len();
        let mut records = Vec::with_capacity(total);
        info!(
            kernels = total,
            locator = self.locator.name(),
            transformer = self.transformer.name(),
            "starting batch"
        );

        for (index, entry) in manifest.entries().iter().enumerate() {
            let kernel = entry.kernel_name();
            println!(
                "Processing kernel {}/{}: '{}' in {}",
                index + 1,
                total,
                kernel,
                entry.kernel_dir().display()
            );

            let run = self.process(entry)?;
            report_skip(&kernel, &run.outcome);
            self.tally.record(&run.outcome);
            info!(
                kernel = %kernel,
                stage = ?run.stage,
                succeeded = run.outcome.is_success(),
                "kernel finished"
            );

            records.push(KernelRecord {
                kernel,
                path: entry.path().display().to_string(),
                function: entry.function_name(&self.function_prefix),
                outcome: run.outcome,
            });
        }

        let report = BatchReport::new(self.tally, records);
        println!("{}", report.summary_line());
        Ok(report)
    }

    /// Run one kernel to `Done` or to a skipped outcome. `Err` is fatal to the run.
    pub fn process(&mut self, entry: &ManifestEntry) -> Result<KernelRun> {
        let kernel = entry.kernel_name();
        let function = entry.function_name(&self.function_prefix);
        let mut tracker = StageTracker::new(&kernel);

        let preprocessed = self
            .toolchain
            .strip_macros(entry.path())
            .with_context(|| format!("macro stripping failed for kernel '{kernel}'"))?;
        tracker.advance(KernelStage::MacroStripped);

        debug!(function = %function, "searching for kernel function");
        let listing = read_listing(&self.layout.resolve(&preprocessed))?;
        let range = match self.locator.locate(&listing, &function) {
            Ok(range) => range,
            Err(err) => return Ok(tracker.locator_failure(err)),
        };
        tracker.advance(KernelStage::Located);

        let snippet = extract(&listing, range, &self.filter);
        tracker.advance(KernelStage::Extracted);
        debug!("original:\n{}", snippet.text());

        let transformed = match self.transformer.transform(&snippet.text(), &function) {
            Ok(body) => body,
            Err(TransformError::Tool(failure)) => {
                return Ok(tracker.tool_failure(FailureStage::Transform, failure));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("transformer setup failed for '{kernel}'"))
            }
        };
        tracker.advance(KernelStage::Transformed);
        debug!("transformed:\n{}", transformed);

        let source = read_listing(&self.layout.resolve(entry.path()))?;
        let context = match SpliceContext::from_listing(&source, &function, self.locator.as_ref()) {
            Ok(context) => context,
            Err(err) => return Ok(tracker.locator_failure(err)),
        };
        let original_body = match snippet.without_signature() {
            Ok(body) => body.text(),
            Err(err) => return Ok(tracker.locator_failure(err)),
        };

        let original_source = self.layout.original_source(&kernel);
        let transformed_source = self.layout.transformed_source(&kernel);
        write_synthesized(
            &self.layout.resolve(&original_source),
            &self
                .synthesizer
                .synthesize(&context, BodyVariant::Original(&original_body)),
        )?;
        write_synthesized(
            &self.layout.resolve(&transformed_source),
            &self
                .synthesizer
                .synthesize(&context, BodyVariant::Transformed(&transformed)),
        )?;
        tracker.advance(KernelStage::Synthesized);

        let original_binary = self.layout.original_binary(&kernel);
        let transformed_binary = self.layout.transformed_binary(&kernel);
        let builds = [
            (&original_source, &original_binary, FailureStage::CompileOriginal),
            (&transformed_source, &transformed_binary, FailureStage::CompileTransformed),
        ];
        for (source, output, stage) in builds {
            let request = CompileRequest {
                source,
                output,
                kernel_dir: entry.kernel_dir(),
            };
            if let Err(failure) = self.toolchain.compile(request) {
                return Ok(tracker.tool_failure(stage, failure));
            }
        }
        tracker.advance(KernelStage::Compiled);

        println!("Timing default {kernel} kernel...");
        let original = match self.toolchain.execute(&original_binary) {
            Ok(execution) => execution,
            Err(failure) => return Ok(tracker.tool_failure(FailureStage::RunOriginal, failure)),
        };
        print_execution(&original);

        println!("Timing transformed {kernel} kernel...");
        let optimized = match self.toolchain.execute(&transformed_binary) {
            Ok(execution) => execution,
            Err(failure) => return Ok(tracker.tool_failure(FailureStage::RunTransformed, failure)),
        };
        print_execution(&optimized);
        tracker.advance(KernelStage::Timed);

        let timings = KernelTimings::new(original.elapsed, optimized.elapsed);
        print_speedup(&kernel, &timings);
        tracker.advance(KernelStage::Done);
        Ok(tracker.finish(KernelOutcome::Succeeded { timings }))
    }
}

fn read_listing(path: &Path) -> Result<LineListing> {
    LineListing::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_synthesized(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn print_execution(execution: &Execution) {
    for stream in [&execution.stdout, &execution.stderr] {
        let text = stream.trim_end();
        if !text.is_empty() {
            println!("{text}");
        }
    }
    println!("  elapsed: {:.3} ms", execution.elapsed.as_secs_f64() * 1000.0);
}

fn print_speedup(kernel: &str, timings: &KernelTimings) {
    match timings.speedup {
        Some(speedup) => println!("  speedup for {kernel}: {speedup:.3}x"),
        None => println!("  speedup for {kernel}: n/a"),
    }
}

fn report_skip(kernel: &str, outcome: &KernelOutcome) {
    match outcome {
        KernelOutcome::Succeeded { .. } => return,
        KernelOutcome::SkippedToolFailure { stage, failure } => {
            warn!(kernel, %stage, exit_code = ?failure.exit_code, "external tool failed");
            match failure.exit_code {
                Some(code) => println!(
                    "{} ({stage}) on kernel '{kernel}' had exit code of {code}",
                    failure.program
                ),
                None => println!("{} ({stage}) on kernel '{kernel}' did not exit normally", failure.program),
            }
            println!("{} stderr:", failure.program);
            println!("{}", failure.diagnostic.trim_end());
        }
        KernelOutcome::SkippedLocatorFailure { reason } => {
            warn!(kernel, %reason, "kernel boundaries not found");
            println!("{reason}");
        }
    }
    println!("skipping kernel {kernel}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyprep_source::BoundaryRange;
    use polyprep_tools::PREPROCESSED_SUFFIX;
    use std::path::PathBuf;
    use std::time::Duration;

    const GEMM: &str = "\
#include <polybench.h>

static
void kernel_gemm(int n, double C[n])
{
  int i;
#pragma scop
  for (i = 0; i < n; i++)
    C[i] = 0;
#pragma endscop
}

int main(void)
{
  return 0;
}
";

    struct EchoTransformer {
        failure: Option<ToolFailure>,
        calls: usize,
    }

    impl Transformer for EchoTransformer {
        fn name(&self) -> &str {
            "echo"
        }

        fn transform(&mut self, _snippet: &str, entry_point: &str) -> Result<String, TransformError> {
            self.calls += 1;
            match &self.failure {
                Some(failure) => Err(failure.clone().into()),
                None => Ok(format!("  /* {entry_point} */\n")),
            }
        }
    }

    /// Fails `compile`/`execute` for outputs whose path ends with the given suffix.
    #[derive(Default)]
    struct CopyToolchain {
        root: PathBuf,
        compiled: Vec<PathBuf>,
        failing_compile: Option<&'static str>,
        failing_execute: Option<&'static str>,
    }

    fn refused(program: &str, target: &Path) -> ToolFailure {
        ToolFailure {
            program: program.into(),
            exit_code: Some(1),
            diagnostic: format!("refused {}", target.display()),
        }
    }

    fn ends_with(path: &Path, suffix: Option<&str>) -> bool {
        suffix.is_some_and(|suffix| path.to_string_lossy().ends_with(suffix))
    }

    impl Toolchain for CopyToolchain {
        fn strip_macros(&mut self, source: &Path) -> Result<PathBuf, ToolFailure> {
            let stem = source.file_stem().unwrap().to_string_lossy().into_owned();
            let output = source.with_file_name(format!("{stem}.{PREPROCESSED_SUFFIX}"));
            fs::copy(self.root.join(source), self.root.join(&output)).unwrap();
            Ok(output)
        }

        fn compile(&mut self, request: CompileRequest<'_>) -> Result<(), ToolFailure> {
            self.compiled.push(request.output.to_path_buf());
            if ends_with(request.output, self.failing_compile) {
                return Err(refused("gcc", request.output));
            }
            Ok(())
        }

        fn execute(&mut self, executable: &Path) -> Result<Execution, ToolFailure> {
            if ends_with(executable, self.failing_execute) {
                return Err(refused("sh", executable));
            }
            Ok(Execution {
                elapsed: Duration::from_millis(5),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn copy_toolchain(layout: &WorkspaceLayout) -> CopyToolchain {
        CopyToolchain {
            root: layout.sources_root().to_path_buf(),
            ..CopyToolchain::default()
        }
    }

    fn echo() -> EchoTransformer {
        EchoTransformer {
            failure: None,
            calls: 0,
        }
    }

    fn add_kernel(layout: &WorkspaceLayout, relative: &str, text: &str) {
        let path = layout.resolve(Path::new(relative));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn setup(dir: &Path) -> (HarnessConfig, WorkspaceLayout) {
        let config = HarnessConfig::default();
        let layout = WorkspaceLayout::new(dir, &config);
        let kernel_dir = layout.resolve(Path::new("linear-algebra/kernels/gemm"));
        fs::create_dir_all(&kernel_dir).unwrap();
        fs::create_dir_all(layout.resolve(Path::new("processed"))).unwrap();
        fs::create_dir_all(layout.resolve(Path::new("bin"))).unwrap();
        fs::write(kernel_dir.join("gemm.c"), GEMM).unwrap();
        (config, layout)
    }

    #[test]
    fn successful_kernel_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        let toolchain = CopyToolchain {
            root: layout.sources_root().to_path_buf(),
            ..CopyToolchain::default()
        };
        let transformer = EchoTransformer {
            failure: None,
            calls: 0,
        };
        let mut driver = BatchDriver::new(&config, layout.clone(), transformer, toolchain);

        let entry = ManifestEntry::new("linear-algebra/kernels/gemm/gemm.c");
        let run = driver.process(&entry).unwrap();
        assert_eq!(run.stage, KernelStage::Done);
        match run.outcome {
            KernelOutcome::Succeeded { timings } => assert_eq!(timings.speedup, Some(1.0)),
            other => panic!("unexpected outcome {other:?}"),
        }

        let original =
            fs::read_to_string(layout.resolve(Path::new("processed/gemm.orig.c"))).unwrap();
        assert!(original.contains("  int i;\n  for (i = 0; i < n; i++)\n    C[i] = 0;\n}\n"));
        assert!(!original.contains("pragma"));

        let transformed =
            fs::read_to_string(layout.resolve(Path::new("processed/gemm.opt.c"))).unwrap();
        assert!(transformed.contains("{\n  /* kernel_gemm */\n}\n\nint main(void)"));
        assert_eq!(
            driver.toolchain.compiled,
            vec![PathBuf::from("bin/gemm_orig"), PathBuf::from("bin/gemm_opt")]
        );
    }

    #[test]
    fn tool_failure_skips_without_writing_files() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        let toolchain = CopyToolchain {
            root: layout.sources_root().to_path_buf(),
            ..CopyToolchain::default()
        };
        let transformer = EchoTransformer {
            failure: Some(ToolFailure {
                program: "spf-ie".into(),
                exit_code: Some(2),
                diagnostic: "unsupported loop nest".into(),
            }),
            calls: 0,
        };
        let mut driver = BatchDriver::new(&config, layout.clone(), transformer, toolchain);

        let run = driver
            .process(&ManifestEntry::new("linear-algebra/kernels/gemm/gemm.c"))
            .unwrap();
        assert_eq!(run.stage, KernelStage::Extracted);
        assert!(matches!(
            run.outcome,
            KernelOutcome::SkippedToolFailure {
                stage: FailureStage::Transform,
                ..
            }
        ));
        assert!(!layout.resolve(Path::new("processed/gemm.orig.c")).exists());
        assert!(!layout.resolve(Path::new("processed/gemm.opt.c")).exists());
        assert!(driver.toolchain.compiled.is_empty());
    }

    #[test]
    fn missing_function_is_a_locator_skip() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, layout) = setup(dir.path());
        config.locator.function_prefix = "compute_".into();
        let toolchain = CopyToolchain {
            root: layout.sources_root().to_path_buf(),
            ..CopyToolchain::default()
        };
        let transformer = EchoTransformer {
            failure: None,
            calls: 0,
        };
        let mut driver = BatchDriver::new(&config, layout, transformer, toolchain);

        let run = driver
            .process(&ManifestEntry::new("linear-algebra/kernels/gemm/gemm.c"))
            .unwrap();
        assert_eq!(run.stage, KernelStage::MacroStripped);
        assert!(matches!(run.outcome, KernelOutcome::SkippedLocatorFailure { .. }));
        assert_eq!(driver.transformer.calls, 0);
    }

    #[test]
    fn compile_failure_skips_kernel_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        add_kernel(
            &layout,
            "linear-algebra/kernels/bicg/bicg.c",
            &GEMM.replace("kernel_gemm", "kernel_bicg"),
        );
        let toolchain = CopyToolchain {
            failing_compile: Some("_opt"),
            ..copy_toolchain(&layout)
        };
        let mut driver = BatchDriver::new(&config, layout, echo(), toolchain);

        let manifest = Manifest::parse(
            "linear-algebra/kernels/gemm/gemm.c\nlinear-algebra/kernels/bicg/bicg.c\n",
        );
        let report = driver.run(&manifest).unwrap();
        assert_eq!(report.summary_line(), "2 benchmarks processed, 0 succeeded, 2 failed");
        for record in &report.kernels {
            assert!(matches!(
                record.outcome,
                KernelOutcome::SkippedToolFailure {
                    stage: FailureStage::CompileTransformed,
                    ..
                }
            ));
        }
        assert_eq!(
            driver.toolchain.compiled,
            vec![
                PathBuf::from("bin/gemm_orig"),
                PathBuf::from("bin/gemm_opt"),
                PathBuf::from("bin/bicg_orig"),
                PathBuf::from("bin/bicg_opt"),
            ]
        );
        assert_eq!(driver.transformer.calls, 2);
    }

    #[test]
    fn original_compile_failure_stops_before_transformed_build() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        let toolchain = CopyToolchain {
            failing_compile: Some("_orig"),
            ..copy_toolchain(&layout)
        };
        let mut driver = BatchDriver::new(&config, layout, echo(), toolchain);

        let run = driver
            .process(&ManifestEntry::new("linear-algebra/kernels/gemm/gemm.c"))
            .unwrap();
        assert_eq!(run.stage, KernelStage::Synthesized);
        assert!(matches!(
            run.outcome,
            KernelOutcome::SkippedToolFailure {
                stage: FailureStage::CompileOriginal,
                ..
            }
        ));
        assert_eq!(driver.toolchain.compiled, vec![PathBuf::from("bin/gemm_orig")]);
    }

    #[test]
    fn execution_failures_name_the_variant() {
        for (suffix, expected) in [
            ("_orig", FailureStage::RunOriginal),
            ("_opt", FailureStage::RunTransformed),
        ] {
            let dir = tempfile::tempdir().unwrap();
            let (config, layout) = setup(dir.path());
            let toolchain = CopyToolchain {
                failing_execute: Some(suffix),
                ..copy_toolchain(&layout)
            };
            let mut driver = BatchDriver::new(&config, layout, echo(), toolchain);

            let run = driver
                .process(&ManifestEntry::new("linear-algebra/kernels/gemm/gemm.c"))
                .unwrap();
            assert_eq!(run.stage, KernelStage::Compiled);
            match run.outcome {
                KernelOutcome::SkippedToolFailure { stage, failure } => {
                    assert_eq!(stage, expected);
                    assert_eq!(failure.exit_code, Some(1));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn brace_on_signature_line_fails_splice_after_transform() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        add_kernel(
            &layout,
            "linear-algebra/kernels/gemm/gemm.c",
            "static\nvoid kernel_gemm(int n) {\n  x = 1;\n}\n",
        );
        let mut driver = BatchDriver::new(&config, layout.clone(), echo(), copy_toolchain(&layout));

        let run = driver
            .process(&ManifestEntry::new("linear-algebra/kernels/gemm/gemm.c"))
            .unwrap();
        assert_eq!(run.stage, KernelStage::Transformed);
        match &run.outcome {
            KernelOutcome::SkippedLocatorFailure { reason } => {
                assert!(reason.contains("'{'"), "{reason}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(driver.transformer.calls, 1);
        assert!(!layout.resolve(Path::new("processed/gemm.orig.c")).exists());
        assert!(driver.toolchain.compiled.is_empty());
    }

    struct RefuseAll;

    impl BoundaryLocator for RefuseAll {
        fn name(&self) -> &str {
            "refuse-all"
        }

        fn locate(&self, listing: &LineListing, function: &str) -> Result<BoundaryRange, LocateError> {
            Err(LocateError::FunctionNotFound {
                function: function.to_string(),
                origin: listing.origin().to_string(),
            })
        }

        fn declaration_start(&self, listing: &LineListing, function: &str) -> Result<usize, LocateError> {
            self.locate(listing, function).map(|range| range.start())
        }
    }

    #[test]
    fn substituted_locator_drives_boundary_search() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        let mut driver = BatchDriver::new(&config, layout.clone(), echo(), copy_toolchain(&layout))
            .with_locator(RefuseAll);
        assert_eq!(driver.locator.name(), "refuse-all");

        let report = driver
            .run(&Manifest::parse("linear-algebra/kernels/gemm/gemm.c\n"))
            .unwrap();
        assert!(matches!(
            report.kernels[0].outcome,
            KernelOutcome::SkippedLocatorFailure { .. }
        ));
        assert_eq!(driver.transformer.calls, 0);
        assert_eq!(driver.tally().failed, 1);
    }
}
