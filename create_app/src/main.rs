use clap::Parser;
use create_app::generator::next_steps;
use create_app::{validate_app_name, AppNames, ExistingTarget, Generator, GeneratorError};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser, Debug)]
#[command(about = "Create a new Lambda app from the MyApp boilerplate")]
struct Cli {
    /// App name in snake_case, e.g. `data_processor`
    name: Option<String>,

    #[arg(long)]
    display_name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Where to create the app (default: ../<name>)
    #[arg(long, short = 'd')]
    target_dir: Option<PathBuf>,

    #[arg(long)]
    author: Option<String>,

    #[arg(long)]
    contact: Option<String>,

    /// Boilerplate location (this directory or its parent)
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Skip optional prompts; an existing target is removed once confirmed
    #[arg(long)]
    quick: bool,

    /// Answer yes to confirmations
    #[arg(long, short = 'y')]
    yes: bool,
}

fn prompt(question: &str, default: Option<&str>) -> io::Result<String> {
    let mut stdout = io::stdout();
    match default {
        Some(d) => write!(stdout, "{} [{}]: ", question, d)?,
        None => write!(stdout, "{}: ", question)?,
    }
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim();
    Ok(match (answer.is_empty(), default) {
        (true, Some(d)) => d.to_string(),
        _ => answer.to_string(),
    })
}

fn confirm(question: &str) -> io::Result<bool> {
    let answer = prompt(&format!("{} (y/N)", question), None)?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

fn ask_name(given: Option<String>, quick: bool) -> Result<String, GeneratorError> {
    if let Some(name) = given {
        validate_app_name(&name)?;
        return Ok(name);
    }
    if quick {
        return Err(GeneratorError::NameRequired);
    }
    loop {
        let name = prompt("App name (snake_case)", None)?;
        match validate_app_name(&name) {
            Ok(()) => return Ok(name),
            Err(e) => println!("{}", e),
        }
    }
}

fn optional(given: Option<String>, quick: bool, question: &str, default: Option<&str>) -> io::Result<Option<String>> {
    if given.is_some() || quick {
        return Ok(given);
    }
    let answer = prompt(question, default)?;
    Ok(Some(answer).filter(|a| !a.is_empty()))
}

fn run(cli: Cli) -> Result<bool, GeneratorError> {
    let source = if cli.source.is_absolute() {
        cli.source.clone()
    } else {
        env::current_dir()?.join(&cli.source)
    };
    let generator = Generator::locate(&source)?;
    generator.validate_boilerplate()?;

    let name = ask_name(cli.name, cli.quick)?;
    let defaults = AppNames::derive(&name, None, None)?;
    let display = optional(cli.display_name, cli.quick, "Display name", Some(&defaults.display))?;
    let description = optional(cli.description, cli.quick, "Description", Some(&defaults.description))?;
    let names = AppNames::derive(&name, display.as_deref(), description.as_deref())?;

    let default_target = generator
        .root()
        .parent()
        .unwrap_or(generator.root())
        .join(&names.lower);
    let target = match cli.target_dir {
        Some(dir) => dir,
        None if cli.quick => default_target,
        None => PathBuf::from(prompt(
            "Target directory",
            Some(&default_target.display().to_string()),
        )?),
    };
    let author = optional(cli.author, cli.quick, "Author name", None)?;
    let contact = optional(cli.contact, cli.quick, "Contact email", None)?;

    println!();
    println!("App name:     {}", names.lower);
    println!("Struct name:  {}", names.pascal);
    println!("Env prefix:   {}_", names.upper);
    println!("Display name: {}", names.display);
    println!("Description:  {}", names.description);
    println!("Target:       {}", target.display());
    if let Some(author) = &author {
        println!("Author:       {}", author);
    }
    if let Some(contact) = &contact {
        println!("Contact:      {}", contact);
    }
    println!();

    if !cli.quick && !cli.yes && !confirm("Create app?")? {
        println!("Cancelled");
        return Ok(false);
    }

    let existing = if !target.exists() {
        ExistingTarget::Fail
    } else if !cli.yes && !confirm(&format!("{} exists. Overwrite?", target.display()))? {
        println!("Cancelled");
        return Ok(false);
    } else if cli.quick {
        ExistingTarget::Replace
    } else {
        ExistingTarget::Overwrite
    };

    generator.generate(&names, &target, existing)?;

    println!();
    println!("Created {} in {}", names.display, target.display());
    println!("Next steps:");
    for (i, step) in next_steps(&names, &target).iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    Ok(true)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).without_time().init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
