use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password, Select};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use parley::chat::Message;
use parley::store::{self, Theme};
use parley::voice::{AudioClip, AudioOutput, ListenEvent, Microphone, Speaker};
use parley::{Accounts, ChatController, Config, GeminiClient, Role, User};

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

/// Parley - voice-enabled AI chat client for the terminal
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat (the default)
    Chat,
    /// Create an account and sign in
    Register,
    /// Sign in with an existing account
    Login,
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test speech synthesis
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,parley=warn",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::Register => cmd_register(&config),
        Command::Login => cmd_login(&config),
        Command::Logout => cmd_logout(&config),
        Command::Whoami => cmd_whoami(&config),
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

fn open_store(config: &Config) -> anyhow::Result<store::RecordStore> {
    std::fs::create_dir_all(&config.data_dir)?;
    Ok(store::open(config.store_path())?)
}

const fn accent(theme: Theme) -> &'static str {
    match theme {
        Theme::Dark => "\x1b[96m",
        Theme::Light => "\x1b[34m",
    }
}

/// The interactive chat REPL
async fn run_chat(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let accounts = Accounts::new(store.clone());

    let user = match accounts.current_user()? {
        Some(user) => user,
        None => interactive_auth(&accounts)?,
    };

    let provider = Arc::new(GeminiClient::new(&config)?);
    let (mut controller, mut listen_events) =
        ChatController::new(provider, store, config.voice.clone(), &user.username)?;
    let mut theme = controller.theme()?;

    println!();
    println!("Welcome, {}. Type /help for commands.", user.username);
    println!();
    for message in controller.current_log() {
        print_message(message, theme);
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}{}{}> ", accent(theme), controller.username(), RESET);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();

        match input.as_str() {
            "" => {}
            "/quit" | "/exit" => break,
            "/help" => print_help(),
            "/new" => {
                let confirmed = Confirm::new()
                    .with_prompt("Start a new chat? Your current conversation will be cleared.")
                    .default(false)
                    .interact()?;
                if confirmed {
                    controller.new_chat()?;
                    println!("Conversation cleared.");
                }
            }
            "/speak" => {
                let was_on = controller.speech_output_enabled()?;
                let now_on = controller.toggle_speech_output()?;
                if now_on {
                    println!("Speech output enabled.");
                } else if was_on {
                    println!("Speech output disabled.");
                } else {
                    println!("Speech output is unavailable on this system.");
                }
            }
            "/theme" => {
                theme = controller.toggle_theme()?;
                println!("Theme: {theme}");
            }
            "/mic" => {
                if let Some(transcript) =
                    capture_voice_input(&controller, &mut listen_events).await
                {
                    println!("{DIM}you (voice): {transcript}{RESET}");
                    send_turn(&mut controller, &transcript, theme).await?;
                }
            }
            "/logout" => {
                accounts.logout()?;
                println!("Signed out.");
                break;
            }
            other if other.starts_with('/') => {
                println!("Unknown command: {other} (try /help)");
            }
            _ => send_turn(&mut controller, &input, theme).await?,
        }
    }

    Ok(())
}

/// Send one turn, rendering streamed fragments as they arrive
async fn send_turn(
    controller: &mut ChatController,
    text: &str,
    theme: Theme,
) -> anyhow::Result<()> {
    print!("{}assistant{}> ", accent(theme), RESET);
    std::io::stdout().flush()?;

    let mut printed = 0usize;
    controller
        .send_message_with(text, |delta| {
            printed += delta.len();
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .await?;

    // A failed turn replaces streamed content with the fixed failure reply;
    // re-render whenever what we printed is not what the log kept.
    let last = controller.current_log().last().map(Message::text);
    if let Some(last) = last
        && last.len() != printed
    {
        if printed > 0 {
            println!();
        }
        print!("{last}");
    }
    println!();
    Ok(())
}

/// One voice capture session; resolves to the final transcript, if any
async fn capture_voice_input(
    controller: &ChatController,
    listen_events: &mut mpsc::UnboundedReceiver<ListenEvent>,
) -> Option<String> {
    if !controller.start_listening() {
        println!("Speech recognition is not supported on this system.");
        return None;
    }

    let mut transcript = None;
    while let Some(event) = listen_events.recv().await {
        match event {
            ListenEvent::Started => {
                println!("{DIM}listening…{RESET}");
            }
            ListenEvent::Transcript(text) => transcript = Some(text),
            ListenEvent::Stopped => break,
        }
    }

    if transcript.is_none() {
        println!("No speech detected.");
    }
    transcript
}

fn print_message(message: &Message, theme: Theme) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Model => "assistant",
    };
    println!("{}{speaker}{}> {}", accent(theme), RESET, message.text());
}

fn print_help() {
    println!("Commands:");
    println!("  /new     start a new chat (clears the conversation)");
    println!("  /speak   toggle spoken replies");
    println!("  /mic     speak your next message");
    println!("  /theme   toggle light/dark prompt colors");
    println!("  /logout  sign out and quit");
    println!("  /quit    quit");
}

/// Prompt until a login or registration succeeds
fn interactive_auth(accounts: &Accounts) -> anyhow::Result<User> {
    loop {
        let choice = Select::new()
            .with_prompt("Welcome to parley")
            .items(&["Log in", "Create account"])
            .default(0)
            .interact()?;

        let username: String = Input::new().with_prompt("Username").interact_text()?;
        let password = Password::new().with_prompt("Password").interact()?;

        let result = if choice == 0 {
            accounts.login(username.trim(), &password)
        } else {
            accounts.register(username.trim(), &password)
        };

        match result {
            Ok(user) => return Ok(user),
            Err(e) => println!("{e}"),
        }
    }
}

fn cmd_register(config: &Config) -> anyhow::Result<()> {
    let accounts = Accounts::new(open_store(config)?);
    let username: String = Input::new().with_prompt("Username").interact_text()?;
    let password = Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;

    match accounts.register(username.trim(), &password) {
        Ok(user) => println!("Registered and signed in as {}.", user.username),
        Err(e) => println!("{e}"),
    }
    Ok(())
}

fn cmd_login(config: &Config) -> anyhow::Result<()> {
    let accounts = Accounts::new(open_store(config)?);
    let username: String = Input::new().with_prompt("Username").interact_text()?;
    let password = Password::new().with_prompt("Password").interact()?;

    match accounts.login(username.trim(), &password) {
        Ok(user) => println!("Signed in as {}.", user.username),
        Err(e) => println!("{e}"),
    }
    Ok(())
}

fn cmd_logout(config: &Config) -> anyhow::Result<()> {
    let accounts = Accounts::new(open_store(config)?);
    accounts.logout()?;
    println!("Signed out.");
    Ok(())
}

fn cmd_whoami(config: &Config) -> anyhow::Result<()> {
    let accounts = Accounts::new(open_store(config)?);
    match accounts.current_user()? {
        Some(user) => println!("{}", user.username),
        None => println!("Not signed in."),
    }
    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test microphone input with a live level meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mic = Microphone::open()?;
    println!("Sample rate: {} Hz", mic.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = mic.peek();
        let rms = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {rms:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
        mic.clear();
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working.");
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000u32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3
        })
        .collect();

    let clip = AudioClip::from_frames(vec![samples], sample_rate)?;
    let output = AudioOutput::new(sample_rate)?;
    let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
    tokio::task::spawn_blocking(move || output.play(&clip, &cancel)).await??;

    println!("If you heard the tone, your speakers are working.");
    Ok(())
}

/// Test speech synthesis end to end
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Synthesizing: \"{text}\"");

    let provider = Arc::new(GeminiClient::new(config)?);
    let speaker = Speaker::new(provider, &config.voice)?;

    speaker.speak(text).await;
    if speaker.active_clips() == 0 {
        println!("Synthesis failed (check your API key and network).");
        return Ok(());
    }

    speaker.drain().await;
    println!("If you heard the speech, synthesis is working.");
    Ok(())
}
