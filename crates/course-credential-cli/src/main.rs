//! CourseCredential CLI — `ccred` command.
//!
//! Operator and learner surface for the credential pipeline: import courses,
//! enroll, submit quizzes, inspect progress, and issue, administer, mint and
//! verify certificates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use course_credential::ledger::{self, LocalLedger};
use course_credential::metadata::store_from_config;
use course_credential::storage::{load_org_key, read_public_key, save_org_key};
use course_credential::time::{micros_to_rfc3339, now_micros};
use course_credential::{
    AdminAction, AdminOutcome, Certificate, CertificateId, Clock, Course, CredentialPipeline,
    Issuance, JsonStore, LessonId, MintOutcome, OrgKeyPair, PipelineConfig, PlatformPolicy,
    Principal, QuizSubmission, Role, RoleSet, SystemClock,
};

const PASSPHRASE_ENV: &str = "CCRED_PASSPHRASE";

// ── Directory helpers ─────────────────────────────────────────────────────────

struct Home {
    root: PathBuf,
}

impl Home {
    fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let root = match explicit {
            Some(root) => root,
            None => {
                let home = std::env::var("HOME").context("HOME not set; pass --home")?;
                PathBuf::from(home).join(".ccred")
            }
        };
        Ok(Self { root })
    }

    fn config(&self) -> PathBuf {
        self.root.join("config.json")
    }

    fn store(&self) -> PathBuf {
        self.root.join("store.json")
    }

    fn key(&self) -> PathBuf {
        self.root.join("org.key")
    }

    fn ledger(&self) -> PathBuf {
        self.root.join("ledger.json")
    }

    fn metadata(&self) -> PathBuf {
        self.root.join("metadata")
    }

    fn require_initialized(&self) -> Result<()> {
        if !self.key().exists() {
            return Err(anyhow!(
                "no pipeline at {} (run `ccred init` first)",
                self.root.display()
            ));
        }
        Ok(())
    }
}

// ── Passphrase helper ─────────────────────────────────────────────────────────

fn read_passphrase(prompt: &str) -> Result<String> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        return Ok(passphrase);
    }
    eprint!("{prompt}");
    let mut passphrase = String::new();
    std::io::stdin()
        .read_line(&mut passphrase)
        .context("failed to read passphrase")?;
    Ok(passphrase.trim().to_string())
}

// ── Output helpers ────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_certificate(cert: &Certificate) {
    println!("Certificate {}", cert.id);
    println!("  Student:      {} ({})", cert.student_name, cert.student_id);
    println!("  Course:       {} [{}]", cert.course_title, cert.course_slug);
    println!("  Issuer:       {}", cert.issuer);
    println!("  Issued:       {}", micros_to_rfc3339(cert.issued_at));
    println!("  Status:       {}", cert.status);
    println!("  Verify at:    {}", cert.verification_url);
    match &cert.metadata_uri {
        Some(uri) => println!("  Metadata:     {uri}"),
        None => println!("  Metadata:     not published"),
    }
    match (&cert.blockchain_tx, &cert.blockchain_network) {
        (Some(tx), Some(network)) => println!("  Minted:       {tx} on {network}"),
        (Some(tx), None) => println!("  Minted:       {tx}"),
        _ => println!("  Minted:       no"),
    }
}

fn print_mint_outcome(outcome: &MintOutcome) {
    match outcome {
        MintOutcome::Failed { reason, .. } => {
            println!("Mint: {} ({reason})", outcome.label())
        }
        _ => println!("Mint: {}", outcome.label()),
    }
}

fn parse_answer(raw: &str) -> Result<(String, u32)> {
    let (question, option) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("answer '{raw}' must look like QUESTION=OPTION"))?;
    let option = option
        .trim()
        .parse()
        .with_context(|| format!("option in '{raw}' is not a number"))?;
    Ok((question.trim().to_string(), option))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(anyhow!("expected true/false, got '{other}'")),
    }
}

// ── CLI structure ─────────────────────────────────────────────────────────────

/// CourseCredential CLI — quiz grading, progress and certificate issuance.
#[derive(Parser, Debug)]
#[command(
    name = "ccred",
    about = "CourseCredential CLI",
    version,
    long_about = "ccred — CourseCredential CLI\n\nGrade lesson quizzes, track course progress, and issue, verify\nand mint course completion certificates."
)]
struct Cli {
    /// Pipeline home directory (default: ~/.ccred)
    #[arg(long, global = true, env = "CCRED_HOME")]
    home: Option<PathBuf>,

    /// Act as this learner id
    #[arg(long = "as", global = true, env = "CCRED_USER")]
    user: Option<String>,

    /// Display name for the acting learner
    #[arg(long, global = true)]
    name: Option<String>,

    /// Role held by the acting user (repeatable: learner, instructor, admin)
    #[arg(long = "role", global = true)]
    roles: Vec<String>,

    /// Print records as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the home directory, default config and organization key
    Init,

    /// Manage the course catalog
    Course {
        #[command(subcommand)]
        subcommand: CourseCommands,
    },

    /// Enroll the acting learner in a course
    Enroll {
        /// Course slug
        slug: String,
    },

    /// Submit and inspect quiz attempts
    Quiz {
        #[command(subcommand)]
        subcommand: QuizCommands,
    },

    /// Show course progress
    Progress {
        #[command(subcommand)]
        subcommand: ProgressCommands,
    },

    /// Issue, administer and verify certificates
    Cert {
        #[command(subcommand)]
        subcommand: CertCommands,
    },

    /// Platform policy settings
    Settings {
        #[command(subcommand)]
        subcommand: SettingsCommands,
    },

    /// Inspect the local ledger
    Ledger {
        #[command(subcommand)]
        subcommand: LedgerCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CourseCommands {
    /// Import a course from a JSON file
    Import {
        /// Path to the course JSON
        file: PathBuf,
    },
    /// List courses in the catalog
    List,
}

#[derive(Subcommand, Debug)]
enum QuizCommands {
    /// Submit answers for a lesson quiz
    Submit {
        /// Lesson id
        lesson: String,
        /// Answer as QUESTION=OPTION (repeatable)
        #[arg(long = "answer", short = 'a')]
        answers: Vec<String>,
    },
    /// List attempts for a lesson, most recent first
    Attempts {
        /// Lesson id
        lesson: String,
    },
}

#[derive(Subcommand, Debug)]
enum ProgressCommands {
    /// Show enrollment and lesson records for a course
    Show {
        /// Course slug
        slug: String,
    },
}

#[derive(Subcommand, Debug)]
enum CertCommands {
    /// Issue the certificate for a completed course
    Issue {
        /// Course slug
        slug: String,
        /// Title printed on the certificate (default: course title)
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Show a certificate
    Show { id: String },
    /// List the acting learner's certificates
    List,
    /// Apply an admin action: verify, revoke, restore or mint
    Action {
        id: String,
        action: String,
        /// Confirm the action
        #[arg(long)]
        yes: bool,
    },
    /// Mint a verified certificate (same as `action <id> mint`)
    Mint {
        id: String,
        /// Confirm the action
        #[arg(long)]
        yes: bool,
    },
    /// Republish a certificate's metadata
    Refresh { id: String },
    /// Publicly verify a certificate by its verification id
    Check { verification_id: String },
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Show platform policy
    Show,
    /// Change platform policy
    Set {
        /// Auto-verify newly issued certificates (true/false)
        #[arg(long)]
        auto_verify: Option<String>,
        /// Mint auto-verified certificates at issuance (true/false)
        #[arg(long)]
        minting: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerCommands {
    /// Verify the hash chain and signatures of the local ledger
    Verify,
}

// ── Context ───────────────────────────────────────────────────────────────────

struct Ctx {
    home: Home,
    principal: Option<Principal>,
    json: bool,
    verbose: bool,
}

impl Ctx {
    fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    fn open_pipeline(&self) -> Result<CredentialPipeline> {
        self.home.require_initialized()?;
        let config = PipelineConfig::load(&self.home.config()).context("failed to load config")?;
        let passphrase = read_passphrase("Organization key passphrase: ")?;
        let signer = Arc::new(
            load_org_key(&self.home.key(), &passphrase).context("failed to unlock organization key")?,
        );
        let store = Arc::new(JsonStore::open(self.home.store()).context("failed to open store")?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = Arc::new(LocalLedger::open(
            self.home.ledger(),
            signer.clone(),
            config.ledger.network.clone(),
            config.ledger.contract.clone(),
            clock.clone(),
        )?);
        let metadata = store_from_config(&config.metadata, &self.home.metadata())?;

        Ok(CredentialPipeline::builder(store, signer)
            .config(config)
            .clock(clock)
            .metadata_store(metadata)
            .ledger(ledger)
            .build()?)
    }

    fn open_store(&self) -> Result<JsonStore> {
        self.home.require_initialized()?;
        JsonStore::open(self.home.store()).context("failed to open store")
    }
}

fn build_principal(user: Option<String>, name: Option<String>, roles: &[String]) -> Result<Option<Principal>> {
    let Some(user) = user else {
        return Ok(None);
    };
    let roles: RoleSet = if roles.is_empty() {
        RoleSet::new().with(Role::Learner)
    } else {
        roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<_, _>>()?
    };
    let mut principal = Principal::learner(user);
    principal.roles = roles;
    principal.display_name = name;
    Ok(Some(principal))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let ctx = Home::resolve(cli.home).and_then(|home| {
        Ok(Ctx {
            home,
            principal: build_principal(cli.user, cli.name, &cli.roles)?,
            json: cli.json,
            verbose: cli.verbose,
        })
    });
    let result = match ctx {
        Ok(ctx) => run(&ctx, cli.command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(ctx: &Ctx, command: Commands) -> Result<()> {
    match command {
        Commands::Init => cmd_init(ctx),
        Commands::Course { subcommand } => match subcommand {
            CourseCommands::Import { file } => cmd_course_import(ctx, &file),
            CourseCommands::List => cmd_course_list(ctx),
        },
        Commands::Enroll { slug } => cmd_enroll(ctx, &slug),
        Commands::Quiz { subcommand } => match subcommand {
            QuizCommands::Submit { lesson, answers } => {
                cmd_quiz_submit(ctx, &lesson, &answers).await
            }
            QuizCommands::Attempts { lesson } => cmd_quiz_attempts(ctx, &lesson),
        },
        Commands::Progress { subcommand } => match subcommand {
            ProgressCommands::Show { slug } => cmd_progress_show(ctx, &slug),
        },
        Commands::Cert { subcommand } => match subcommand {
            CertCommands::Issue { slug, title } => cmd_cert_issue(ctx, &slug, &title).await,
            CertCommands::Show { id } => cmd_cert_show(ctx, &id),
            CertCommands::List => cmd_cert_list(ctx),
            CertCommands::Action { id, action, yes } => {
                cmd_cert_action(ctx, &id, &action, yes).await
            }
            CertCommands::Mint { id, yes } => cmd_cert_action(ctx, &id, "mint", yes).await,
            CertCommands::Refresh { id } => cmd_cert_refresh(ctx, &id).await,
            CertCommands::Check { verification_id } => cmd_cert_check(ctx, &verification_id),
        },
        Commands::Settings { subcommand } => match subcommand {
            SettingsCommands::Show => cmd_settings_show(ctx),
            SettingsCommands::Set {
                auto_verify,
                minting,
            } => cmd_settings_set(ctx, auto_verify.as_deref(), minting.as_deref()),
        },
        Commands::Ledger { subcommand } => match subcommand {
            LedgerCommands::Verify => cmd_ledger_verify(ctx),
        },
    }
}

// ── Command implementations ───────────────────────────────────────────────────

/// `ccred init`
fn cmd_init(ctx: &Ctx) -> Result<()> {
    let home = &ctx.home;
    if home.key().exists() {
        return Err(anyhow!(
            "pipeline already initialized at {}",
            home.root.display()
        ));
    }
    std::fs::create_dir_all(&home.root).context("failed to create home directory")?;

    let passphrase = read_passphrase("Passphrase for the organization key: ")?;
    if passphrase.is_empty() {
        return Err(anyhow!("passphrase cannot be empty"));
    }
    if std::env::var(PASSPHRASE_ENV).is_err() {
        let confirm = read_passphrase("Confirm passphrase: ")?;
        if passphrase != confirm {
            return Err(anyhow!("passphrases do not match"));
        }
    }

    if !home.config().exists() {
        PipelineConfig::default().save(&home.config())?;
    }
    let key = OrgKeyPair::generate();
    save_org_key(&key, &home.key(), &passphrase, now_micros()).context("failed to save key")?;

    println!("Initialized pipeline at {}", home.root.display());
    println!("  Organization key: {}", key.fingerprint());
    if ctx.verbose {
        println!("  Public key:       {}", key.public_key_base64());
        println!("  Config:           {}", home.config().display());
    }
    Ok(())
}

/// `ccred course import FILE`
fn cmd_course_import(ctx: &Ctx, file: &Path) -> Result<()> {
    let raw = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let course: Course = serde_json::from_slice(&raw).context("invalid course JSON")?;
    let slug = course.slug.clone();
    let lessons = course.lesson_count();
    let pipeline = ctx.open_pipeline()?;
    pipeline.import_course(ctx.principal(), course)?;
    println!("Imported '{slug}' ({lessons} lessons)");
    Ok(())
}

/// `ccred course list`
fn cmd_course_list(ctx: &Ctx) -> Result<()> {
    let store = ctx.open_store()?;
    let courses: Vec<Course> = store.read(|s| s.courses.values().cloned().collect())?;
    if ctx.json {
        return print_json(&courses);
    }
    if courses.is_empty() {
        println!("No courses.");
    }
    for course in &courses {
        println!("{:<24} {} ({} lessons)", course.slug, course.title, course.lesson_count());
        if ctx.verbose {
            for lesson in course.lessons() {
                println!("    {:<28} {} ({} questions)", lesson.id, lesson.title, lesson.quiz.len());
            }
        }
    }
    Ok(())
}

/// `ccred enroll SLUG`
fn cmd_enroll(ctx: &Ctx, slug: &str) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let enrollment = pipeline.enroll(ctx.principal(), slug)?;
    if ctx.json {
        return print_json(&enrollment);
    }
    println!(
        "Enrolled {} in '{}' ({}%)",
        enrollment.learner_id, enrollment.course_slug, enrollment.progress
    );
    Ok(())
}

/// `ccred quiz submit LESSON --answer Q=OPT ...`
async fn cmd_quiz_submit(ctx: &Ctx, lesson: &str, answers: &[String]) -> Result<()> {
    let mut submission = QuizSubmission::new(LessonId(lesson.to_string()));
    for raw in answers {
        let (question, option) = parse_answer(raw)?;
        submission = submission.answer(question, option);
    }

    let pipeline = ctx.open_pipeline()?;
    let result = pipeline.submit_quiz(ctx.principal(), &submission).await?;

    println!(
        "Score: {}% ({}) attempt #{}",
        result.score,
        if result.is_passed { "passed" } else { "failed" },
        result.attempt_no
    );
    if let Some(until) = result.locked_until {
        println!("Attempts exhausted: locked until {}", micros_to_rfc3339(until));
    }
    if let Some(progress) = result.course_progress {
        println!("Course progress: {progress}%");
    }
    if let Some(issuance) = result.issuance {
        report_issuance(ctx, issuance).await?;
    }
    Ok(())
}

/// `ccred quiz attempts LESSON`
fn cmd_quiz_attempts(ctx: &Ctx, lesson: &str) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let attempts = pipeline.attempts(ctx.principal(), &LessonId(lesson.to_string()))?;
    if ctx.json {
        return print_json(&attempts);
    }
    if attempts.is_empty() {
        println!("No attempts.");
    }
    for a in &attempts {
        let lock = a
            .locked_until
            .map(|t| format!(" locked until {}", micros_to_rfc3339(t)))
            .unwrap_or_default();
        println!(
            "#{:<3} {:>3}% {:<6} {}{lock}",
            a.attempt_no,
            a.score,
            if a.is_passed { "pass" } else { "fail" },
            micros_to_rfc3339(a.created_at)
        );
    }
    Ok(())
}

/// `ccred progress show SLUG`
fn cmd_progress_show(ctx: &Ctx, slug: &str) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let (enrollment, records) = pipeline.progress(ctx.principal(), slug)?;
    if ctx.json {
        return print_json(&serde_json::json!({
            "enrollment": enrollment,
            "lessons": records,
        }));
    }
    println!(
        "{} in '{}': {}%{}",
        enrollment.learner_id,
        enrollment.course_slug,
        enrollment.progress,
        if enrollment.completed { " (completed)" } else { "" }
    );
    for r in &records {
        println!(
            "  {:<28} {:>3}% {}",
            r.lesson_id,
            r.score,
            if r.is_passed { "passed" } else { "not passed" }
        );
    }
    Ok(())
}

/// `ccred cert issue SLUG [--title TITLE]`
async fn cmd_cert_issue(ctx: &Ctx, slug: &str, title: &str) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let issuance = pipeline.auto_issue(ctx.principal(), slug, title).await?;
    report_issuance(ctx, issuance).await
}

/// Print an issuance. A scheduled mint is awaited so its outcome is shown
/// before the process exits.
async fn report_issuance(ctx: &Ctx, issuance: Issuance) -> Result<()> {
    if issuance.already_existed() {
        println!("Certificate already exists.");
    } else {
        println!("Certificate issued.");
    }
    let (cert, mint) = issuance.into_parts();

    let cert = match mint {
        Some(task) => {
            let outcome = task.join().await?;
            print_mint_outcome(&outcome);
            outcome.certificate().clone()
        }
        None => cert,
    };
    if ctx.json {
        print_json(&cert)
    } else {
        print_certificate(&cert);
        Ok(())
    }
}

/// `ccred cert show ID`
fn cmd_cert_show(ctx: &Ctx, id: &str) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let cert = pipeline.certificate(ctx.principal(), &CertificateId(id.to_string()))?;
    if ctx.json {
        return print_json(&cert);
    }
    print_certificate(&cert);
    Ok(())
}

/// `ccred cert list`
fn cmd_cert_list(ctx: &Ctx) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let certs = pipeline.certificates(ctx.principal())?;
    if ctx.json {
        return print_json(&certs);
    }
    if certs.is_empty() {
        println!("No certificates.");
    }
    for c in &certs {
        println!(
            "{}  {:<20} {:<9} {}",
            c.id,
            c.course_slug,
            c.status,
            if c.is_minted() { "minted" } else { "" }
        );
    }
    Ok(())
}

/// `ccred cert action ID ACTION [--yes]`
async fn cmd_cert_action(ctx: &Ctx, id: &str, action: &str, yes: bool) -> Result<()> {
    let action: AdminAction = action.parse()?;
    let pipeline = ctx.open_pipeline()?;
    let outcome = pipeline
        .admin_certificate_action(ctx.principal(), &CertificateId(id.to_string()), action, yes)
        .await?;
    if let AdminOutcome::Mint(mint) = &outcome {
        print_mint_outcome(mint);
    }
    if ctx.json {
        return print_json(outcome.certificate());
    }
    print_certificate(outcome.certificate());
    Ok(())
}

/// `ccred cert refresh ID`
async fn cmd_cert_refresh(ctx: &Ctx, id: &str) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let cert = pipeline
        .refresh_metadata(ctx.principal(), &CertificateId(id.to_string()))
        .await?;
    println!(
        "Metadata republished: {}",
        cert.metadata_uri.as_deref().unwrap_or("-")
    );
    Ok(())
}

/// `ccred cert check VERIFICATION_ID`
fn cmd_cert_check(ctx: &Ctx, verification_id: &str) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let check = pipeline.verify_certificate(verification_id)?;
    if ctx.json {
        return print_json(&check);
    }
    print_certificate(&check.certificate);
    println!(
        "Seal:          {}",
        if check.seal_valid { "valid" } else { "INVALID" }
    );
    for e in &check.errors {
        println!("  - {e}");
    }
    println!(
        "Authoritative: {}",
        if check.is_authoritative { "yes" } else { "no" }
    );
    Ok(())
}

/// `ccred settings show`
fn cmd_settings_show(ctx: &Ctx) -> Result<()> {
    let store = ctx.open_store()?;
    let policy = store.read(|s| s.policy)?;
    if ctx.json {
        return print_json(&policy);
    }
    println!("auto_verify_certificates:   {}", policy.auto_verify_certificates);
    println!("blockchain_minting_enabled: {}", policy.blockchain_minting_enabled);
    Ok(())
}

/// `ccred settings set [--auto-verify B] [--minting B]`
fn cmd_settings_set(ctx: &Ctx, auto_verify: Option<&str>, minting: Option<&str>) -> Result<()> {
    let pipeline = ctx.open_pipeline()?;
    let current = pipeline.policy()?;
    let policy = PlatformPolicy {
        auto_verify_certificates: auto_verify
            .map(parse_bool)
            .transpose()?
            .unwrap_or(current.auto_verify_certificates),
        blockchain_minting_enabled: minting
            .map(parse_bool)
            .transpose()?
            .unwrap_or(current.blockchain_minting_enabled),
    };
    pipeline.set_policy(ctx.principal(), policy)?;
    println!(
        "Policy updated: auto_verify={} minting={}",
        policy.auto_verify_certificates, policy.blockchain_minting_enabled
    );
    Ok(())
}

/// `ccred ledger verify`
fn cmd_ledger_verify(ctx: &Ctx) -> Result<()> {
    ctx.home.require_initialized()?;
    let path = ctx.home.ledger();
    if !path.exists() {
        println!("Ledger is empty.");
        return Ok(());
    }
    let info = read_public_key(&ctx.home.key())?;
    let trusted = course_credential::crypto::keys::verifying_key_from_base64(&info.public_key)?;
    let entries = ledger::local::read_entries(&path)?;
    ledger::verify_chain(&entries, Some(&trusted))?;
    println!("Ledger valid: {} entries signed by {}", entries.len(), info.fingerprint);
    if ctx.verbose {
        for e in &entries {
            println!(
                "  block {:<5} {} {}",
                e.block_number(),
                e.tx_hash(),
                e.metadata_uri
            );
        }
    }
    Ok(())
}
