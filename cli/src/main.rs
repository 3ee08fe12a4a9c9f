/*
    swipetune | Swipe-to-like music discovery client core.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::debug;
use std::fs::File;
use std::io::Write;
use std::process;
use std::sync::Arc;
use swipetune_core::config::SPOTIFY_SCOPES;
use swipetune_core::reconciler::LIBRARY_UNAVAILABLE_MESSAGE;
use swipetune_core::{
    AuthFlow, Config, DefaultPlaylistReconciler, FileStore, PostgrestPlaylists, SessionPoller,
    SpotifyContent, SupabaseAuth, TokenCache,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "swipetune")]
#[command(about = "Sign in to Swipetune with Spotify and prepare your library", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the URL that starts the Spotify sign-in flow
    Login,
    /// Completes sign-in from the deep-link callback URL and prepares the default playlist
    Callback {
        /// The full callback URL, e.g. swipetune://login-callback#access_token=...&refresh_token=...
        #[arg(value_name = "URL")]
        url: String,
        /// Forget the saved default playlist before reconciling
        #[arg(long)]
        reset_playlist: bool,
        /// Write the default playlist reference to a JSON file
        #[arg(long)]
        json: Option<String>,
    },
    /// Shows whether a Spotify token is cached
    Status,
    /// Signs out and clears the cached Spotify token
    Logout,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // Silently ignore
    }

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    match &cli.command {
        Commands::Login => handle_login(&config).await,
        Commands::Callback {
            url,
            reset_playlist,
            json,
        } => handle_callback(&config, url, *reset_playlist, json.as_deref()).await,
        Commands::Status => handle_status(&config).await,
        Commands::Logout => handle_logout(&config).await,
    }
}

async fn open_token_cache(config: &Config) -> TokenCache {
    let cache = TokenCache::new();
    cache
        .initialize(Arc::new(FileStore::new(&config.token_store_path)))
        .await;
    if !cache.load_from_store().await {
        eprintln!(
            "[WARN] Could not read {}; starting with an empty token cache.",
            config.token_store_path.display()
        );
    }
    cache
}

fn auth_flow(config: &Config, auth: Arc<SupabaseAuth>, cache: TokenCache) -> AuthFlow {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling sign-in");
            on_interrupt.cancel();
        }
    });

    let poller = SessionPoller::from_config(&config.poll).with_cancellation(cancel);
    AuthFlow::new(auth, cache, poller)
}

async fn handle_login(config: &Config) {
    let auth = Arc::new(SupabaseAuth::new(
        &config.supabase_url,
        &config.supabase_anon_key,
    ));
    let url = match auth.authorize_url(&config.redirect_uri, SPOTIFY_SCOPES) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("[ERROR] Could not build the sign-in URL: {}", e);
            process::exit(1);
        }
    };

    let cache = open_token_cache(config).await;
    let flow = auth_flow(config, auth, cache);
    println!("{}", flow.start_login());
    println!();
    println!("Open this URL in your browser to sign in with Spotify:");
    println!("   {}", url);
    println!();
    println!("Then run: swipetune callback '<the URL you were redirected to>'");
}

async fn handle_callback(config: &Config, url: &str, reset_playlist: bool, json_path: Option<&str>) {
    let cache = open_token_cache(config).await;
    let auth = Arc::new(SupabaseAuth::new(
        &config.supabase_url,
        &config.supabase_anon_key,
    ));
    let flow = auth_flow(config, auth, cache.clone());

    println!("Completing sign-in...");
    let session = match flow.complete_callback(url).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Sign-in failed: {}", e);
            eprintln!("Run 'swipetune login' to try again.");
            process::exit(1);
        }
    };
    println!("{}", flow.state());

    let playlist = match prepare_library(config, &cache, &session, reset_playlist).await {
        Ok(playlist) => playlist,
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] {}", LIBRARY_UNAVAILABLE_MESSAGE);
            eprintln!("        ({:#})", e);
            process::exit(1);
        }
    };

    println!();
    println!("---------------------------------------------------");
    println!("LIBRARY READY");
    println!("---------------------------------------------------");
    println!("Default playlist: {}", playlist);
    println!("---------------------------------------------------");

    if let Some(path) = json_path {
        match File::create(path) {
            Ok(mut file) => {
                let json_content = serde_json::to_string_pretty(&playlist).unwrap_or_default();
                if let Err(e) = file.write_all(json_content.as_bytes()) {
                    eprintln!();
                    eprintln!("[ERROR] Failed to write playlist to file: {}", e);
                } else {
                    println!();
                    println!("[SAVED] Playlist reference saved to: {}", path);
                }
            }
            Err(e) => eprintln!("[ERROR] Failed to create file '{}': {}", path, e),
        }
    }
}

async fn prepare_library(
    config: &Config,
    cache: &TokenCache,
    session: &swipetune_core::Session,
    reset_playlist: bool,
) -> anyhow::Result<swipetune_core::PlaylistRef> {
    let content = Arc::new(SpotifyContent::from_cache(cache).context("Spotify client")?);
    let spotify_user = content
        .current_user_id()
        .await
        .context("Looking up Spotify user")?;

    let store = Arc::new(PostgrestPlaylists::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        &session.access_token,
    ));
    let reconciler = DefaultPlaylistReconciler::new(store, content)
        .with_policy(config.persist_failure_policy);

    if reset_playlist {
        reconciler
            .reset_default(&session.user_id)
            .await
            .context("Resetting default playlist")?;
    }

    let playlist = reconciler
        .ensure_default(&session.user_id, &spotify_user)
        .await
        .context("Ensuring default playlist")?;
    Ok(playlist)
}

async fn handle_status(config: &Config) {
    let cache = open_token_cache(config).await;

    println!("Token store:    {}", config.token_store_path.display());
    if cache.has_token() {
        let access = cache.access_token().unwrap_or_default();
        let preview: String = access.chars().take(6).collect();
        println!("Spotify token:  {}... (cached)", preview);
        println!(
            "Refresh token:  {}",
            if cache.refresh_token().is_some() {
                "present"
            } else {
                "absent"
            }
        );
    } else {
        println!("Spotify token:  none. Run 'swipetune login' to sign in.");
    }
}

async fn handle_logout(config: &Config) {
    let cache = open_token_cache(config).await;
    let auth = Arc::new(SupabaseAuth::new(
        &config.supabase_url,
        &config.supabase_anon_key,
    ));
    let flow = auth_flow(config, auth, cache);

    match flow.sign_out().await {
        Ok(()) => println!("[OK] Signed out. Cached Spotify token removed."),
        Err(e) => {
            eprintln!("[ERROR] Sign-out failed: {}", e);
            process::exit(1);
        }
    }
}
