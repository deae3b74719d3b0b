//! Command line front end for decoding gRPC-Web bodies.
//!
//! ```sh
//! # Decode a request body with the schema of the method
//! grpcweb-decoder decode --descriptor-set set.pb --path /helloworld.Greeter/SayHello --body req.bin
//!
//! # List the methods of a descriptor set
//! grpcweb-decoder services --descriptor-set set.pb
//!
//! # Run the callout against a variables file
//! grpcweb-decoder callout --properties props.toml --variables vars.toml --body req.bin
//! ```

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use prost::Message;
use prost_types::FileDescriptorSet;
use tracing::info;

use grpcweb_decoder::callout::SimpleMessageContext;
use grpcweb_decoder::{
    decode_message, Callout, Context, DecodeRequest, DescriptorEncoding, ExecutionResult,
    MessageTarget, Properties,
};

/// Decode gRPC-Web message bodies with runtime protobuf descriptors
#[derive(Parser)]
#[command(name = "grpcweb-decoder")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli
{
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands
{
    /// Decode one message body
    Decode
    {
        /// File holding a serialized FileDescriptorSet
        #[arg(long)]
        descriptor_set: Option<PathBuf>,

        /// The descriptor set file is base64 text
        #[arg(long)]
        descriptor_base64: bool,

        /// Request path, such as /package.Service/Method
        #[arg(long)]
        path: Option<String>,

        /// File holding the gRPC-Web body
        #[arg(long)]
        body: PathBuf,

        /// The body is base64 encoded (grpc-web-text)
        #[arg(long)]
        body_base64: bool,

        /// Decode the body as the method output
        #[arg(long)]
        response: bool,
    },

    /// List the methods declared in a descriptor set
    Services
    {
        /// File holding a serialized FileDescriptorSet
        #[arg(long)]
        descriptor_set: PathBuf,

        /// The descriptor set file is base64 text
        #[arg(long)]
        descriptor_base64: bool,
    },

    /// Run the callout and print the resulting flow variables
    Callout
    {
        /// TOML file with the callout properties
        #[arg(long)]
        properties: PathBuf,

        /// TOML file with the initial flow variables
        #[arg(long)]
        variables: PathBuf,

        /// File holding the request body
        #[arg(long)]
        body: PathBuf,

        /// File holding the response body
        #[arg(long)]
        response_body: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>>
{
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("grpcweb_decoder=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode {
            descriptor_set,
            descriptor_base64,
            path,
            body,
            body_base64,
            response,
        } => {
            let descriptor = descriptor_set.map(fs::read).transpose()?;
            let body = fs::read(body)?;
            let request = DecodeRequest {
                descriptor_set: descriptor.as_deref(),
                descriptor_encoding: match descriptor_base64 {
                    true => DescriptorEncoding::Base64,
                    false => DescriptorEncoding::Binary,
                },
                request_path: path.as_deref(),
                target: match response {
                    true => MessageTarget::Response,
                    false => MessageTarget::Request,
                },
                body: &body,
                body_is_base64: body_base64,
            };

            let outcome = decode_message(&request);
            eprint!("{}", outcome.diagnostics.stdout());
            eprint!("{}", outcome.diagnostics.stderr());
            match outcome.decoded {
                Some(decoded) => println!("{}", decoded),
                None => return Err("message could not be decoded".into()),
            }
        }

        Commands::Services {
            descriptor_set,
            descriptor_base64,
        } => {
            let mut bytes = fs::read(descriptor_set)?;
            if descriptor_base64 {
                bytes = STANDARD.decode(String::from_utf8(bytes)?.trim())?;
            }

            let set = FileDescriptorSet::decode(&bytes[..])?;
            let context = Context::from_file_descriptor_set(&set)?;
            info!(files = set.file.len(), "Built descriptor set");

            for service in context.iter_services() {
                for rpc in &service.rpcs {
                    println!(
                        "/{}/{} ({} -> {})",
                        service.full_name,
                        rpc.name,
                        context.resolve_message(rpc.input.message).full_name,
                        context.resolve_message(rpc.output.message).full_name,
                    );
                }
            }
        }

        Commands::Callout {
            properties,
            variables,
            body,
            response_body,
        } => {
            let properties = Properties::from_toml(&fs::read_to_string(properties)?)?;
            let variables: BTreeMap<String, String> =
                toml::from_str(&fs::read_to_string(variables)?)?;

            let mut ctx = SimpleMessageContext {
                variables,
                request: Bytes::from(fs::read(body)?),
                response: match response_body {
                    Some(path) => Bytes::from(fs::read(path)?),
                    None => Bytes::new(),
                },
            };

            let result = Callout::new(properties).execute(&mut ctx);
            println!("{}", serde_json::to_string_pretty(&ctx.variables)?);
            if result == ExecutionResult::Abort {
                return Err("callout aborted".into());
            }
        }
    }

    Ok(())
}
