use clap::Parser;
use serde_json::json;
use tilestage::cli::{build_stage, Cli, Command};
use tilestage::model::{RecognizeResult, RunRequest};
use tilestage::StageResult;

fn main() {
    tilestage::logging::init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> StageResult<()> {
    let cli = Cli::parse();
    let stage = build_stage(&cli.refs)?;

    match cli.command {
        Command::Run(args) => {
            if let Some(path) = &args.frame {
                stage.capture.push_frame(std::fs::read(path)?);
            }
            let request = RunRequest::new(args.scene)
                .with_style(args.flow.style)
                .with_safe(args.flow.safe());
            let result = stage.orchestrator.run_scene(&request);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Auto(args) => {
            if let Some(path) = &args.frame {
                stage.capture.push_frame(std::fs::read(path)?);
            }
            let result = stage
                .orchestrator
                .run_auto(args.flow.style, args.flow.safe());
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Prepare(flow) => {
            let result = stage.orchestrator.prepare(flow.style, flow.safe());
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Execute(args) => {
            let recognized = args
                .label
                .map(|label| RecognizeResult::new(label, args.confidence));
            let result =
                stage
                    .orchestrator
                    .execute(args.scene, args.flow.style, args.flow.safe(), recognized);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Calibrate(args) => {
            let bytes = std::fs::read(&args.image)?;
            stage.orchestrator.calibrate(args.label, &bytes)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "calibrated": args.label,
                    "references": stage.orchestrator.reference_status(),
                }))?
            );
            Ok(())
        }
        Command::Identify(args) => {
            let bytes = std::fs::read(&args.image)?;
            let result = stage.orchestrator.identify(&bytes);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Status => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": stage.orchestrator.snapshot(),
                    "references": stage.orchestrator.reference_status(),
                }))?
            );
            Ok(())
        }
        Command::Estop => {
            stage.orchestrator.emergency_stop()?;
            println!("{}", serde_json::to_string_pretty(&json!({"stopped": true}))?);
            Ok(())
        }
        Command::Home => {
            stage.orchestrator.home()?;
            println!("{}", serde_json::to_string_pretty(&json!({"homed": true}))?);
            Ok(())
        }
        Command::Express(args) => {
            stage.orchestrator.express(args.to_expression())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"expressed": true}))?
            );
            Ok(())
        }
    }
}
