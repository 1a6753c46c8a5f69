use anyhow::{anyhow, Result};
use clap::Parser as _;
use pcsc::Context;
use rand::RngCore;
use talisman::ctap2::{
    AuthenticatorData, CredentialParameters, MakeCredentialRequest, Options, RelyingParty, User,
};
use talisman::transport::Pcsc;
use talisman::Token;
use tracing::{debug, trace};

#[derive(clap::Parser, Debug)]
struct Args {
    /// Increase log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    quiet: u8,

    /// Use a specific reader (from list-readers).
    #[arg(short, long)]
    reader: Option<String>,

    /// Command.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// List connected readers.
    ListReaders,

    /// Query the token's capabilities.
    Info,

    /// Create a credential on the token.
    Register {
        /// Relying party id, eg. a domain name.
        #[arg(long)]
        rp_id: String,

        /// Human-readable relying party name; defaults to the id.
        #[arg(long)]
        rp_name: Option<String>,

        /// User name to register the credential for.
        #[arg(long)]
        user_name: String,

        /// Ask for a discoverable (resident) credential.
        #[arg(long)]
        rk: bool,

        /// Ask for user verification.
        #[arg(long)]
        uv: bool,
    },
}

impl Command {
    pub fn run(&self, args: &Args) -> Result<()> {
        match self {
            Self::ListReaders => list_readers(args),
            Self::Info => info(args),
            Self::Register {
                rp_id,
                rp_name,
                user_name,
                rk,
                uv,
            } => register(args, rp_id, rp_name.as_deref(), user_name, *rk, *uv),
        }
    }
}

fn list_readers(_args: &Args) -> Result<()> {
    let ctx = Context::establish(pcsc::Scope::User)?;
    let mut readers_buf = [0; 2048];
    for name in ctx.list_readers(&mut readers_buf)? {
        println!("{}", name.to_str()?);
    }
    Ok(())
}

fn info(args: &Args) -> Result<()> {
    let mut token = connect(args)?;
    let info = token.get_info()?;
    println!("{:#?}", info);
    Ok(())
}

fn register(
    args: &Args,
    rp_id: &str,
    rp_name: Option<&str>,
    user_name: &str,
    rk: bool,
    uv: bool,
) -> Result<()> {
    // The client data (and so its hash) would normally come from the
    // relying party; a random challenge stands in for it here.
    let mut client_data_hash = vec![0; 32];
    rand::thread_rng().fill_bytes(&mut client_data_hash);
    let mut user_id = vec![0; 16];
    rand::thread_rng().fill_bytes(&mut user_id);

    let req = MakeCredentialRequest {
        client_data_hash,
        rp: RelyingParty {
            id: rp_id.into(),
            name: rp_name.unwrap_or(rp_id).into(),
        },
        user: User {
            id: user_id,
            name: user_name.into(),
        },
        pub_key_cred_params: vec![
            CredentialParameters::rs256(),
            CredentialParameters::es256(),
        ],
        options: Options { rk, uv },
    };

    let mut token = connect(args)?;
    let rsp = token.make_credential(&req)?;
    let ad = AuthenticatorData::parse(&rsp.auth_data)?;

    println!("fmt:        {}", rsp.fmt);
    println!("rp id hash: {}", hex::encode(ad.rp_id_hash));
    println!("flags:      {:?}", ad.flags);
    println!("sign count: {}", ad.sign_count);
    println!("att alg:    {}", rsp.att_stmt.alg);
    println!("att sig:    {}", hex::encode(&rsp.att_stmt.sig));
    Ok(())
}

/// Connects to a reader, wraps the card in a [`Token`] and selects the
/// FIDO applet.
fn connect(args: &Args) -> Result<Token<Pcsc>> {
    let ctx = Context::establish(pcsc::Scope::User)?;
    let card = select_card(&ctx, &args.reader)?;
    let mut token = Token::new(Pcsc::new(card));

    let version = token.select()?;
    debug!(version = %String::from_utf8_lossy(&version), "Applet selected");
    Ok(token)
}

fn select_card(ctx: &Context, name_: &Option<String>) -> Result<pcsc::Card> {
    Ok(if let Some(name) = name_ {
        debug!(name, "Connecting to named reader");
        // If the --reader flag is passed, use the reader name verbatim.
        ctx.connect(
            std::ffi::CString::new(name.clone())?.as_c_str(),
            pcsc::ShareMode::Exclusive,
            pcsc::Protocols::ANY,
        )?
    } else {
        // If not, use the first available reader.
        let mut readers_buf = [0; 2048];
        debug!("Listing available readers");
        let name = ctx
            .list_readers(&mut readers_buf)?
            .next()
            .ok_or(anyhow!("No supported reader connected"))?;

        debug!(?name, "Connecting to first available reader");
        ctx.connect(name, pcsc::ShareMode::Exclusive, pcsc::Protocols::ANY)?
    })
}

fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(match (2 + args.verbose).saturating_sub(args.quiet) {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            4.. => tracing::Level::TRACE,
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    trace!(?args, "Starting up");
    args.command.run(&args)
}
