use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{JobRecord, JobRequest, Project, ProjectRequest};
use reqwest::Client;
use std::env;
use std::time::Duration;

/// URL base del server:
/// - se puede fijar con SERVER_URL
/// - default http://localhost:8080 (para pruebas locales)
fn server_base_url() -> String {
    env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el server de proyectos ML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crea un proyecto nuevo
    CreateProject {
        #[arg(value_name = "NOMBRE")]
        name: String,

        #[arg(long)]
        description: Option<String>,
    },
    /// Lista los proyectos existentes
    Projects,
    /// Lanza un job de entrenamiento simulado en un proyecto
    Submit {
        #[arg(value_name = "PROJECT_ID")]
        project_id: String,

        /// Usa una config de modelo guardada en vez de epochs/steps inline
        #[arg(long)]
        model_id: Option<String>,

        #[arg(long, default_value_t = 5)]
        epochs: u64,

        #[arg(long = "steps-per-epoch", default_value_t = 20)]
        steps_per_epoch: u64,
    },
    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
    /// Pollea un job en intervalo fijo hasta que llegue a estado terminal
    Watch {
        #[arg(value_name = "JOB_ID")]
        id: String,

        /// Intervalo de polling en milisegundos
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Cancela un job en curso
    Cancel {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
}

fn print_job(job: &JobRecord) {
    println!("Job:");
    println!("  id: {}", job.id);
    println!("  proyecto: {}", job.project_id);
    println!("  estado: {:?}", job.status);
    println!("  progreso: {}%", job.progress);
    println!("  samples: {}", job.metrics.len());

    if let Some(last) = job.metrics.last() {
        println!(
            "  última métrica: step={} loss={:.4} accuracy={:.4} ({} ms)",
            last.step, last.loss, last.accuracy, last.elapsed_ms
        );
    }
    if let Some(ref err) = job.error {
        println!("  error: {}", err);
    }

    println!("  submitted_at: {}", job.submitted_at);
    if let Some(ref started) = job.started_at {
        println!("  iniciado: {}", started);
    }
    if let Some(ref finished) = job.finished_at {
        println!("  finalizado: {}", finished);
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = server_base_url();

    match cli.command {
        Commands::CreateProject { name, description } => {
            let url = format!("{}/api/v1/projects", base_url);
            let resp = client
                .post(&url)
                .json(&ProjectRequest { name, description })
                .send()
                .await?;

            let project: Project = resp.json().await?;
            println!("Proyecto creado:");
            println!("  id: {}", project.id);
            println!("  nombre: {}", project.name);
        }

        Commands::Projects => {
            let url = format!("{}/api/v1/projects", base_url);
            let resp = client.get(&url).send().await?;
            let projects: Vec<Project> = resp.json().await?;

            if projects.is_empty() {
                println!("No hay proyectos.");
            } else {
                for p in projects {
                    println!("{}  {}", p.id, p.name);
                }
            }
        }

        Commands::Submit {
            project_id,
            model_id,
            epochs,
            steps_per_epoch,
        } => {
            let url = format!("{}/api/v1/projects/{}/jobs", base_url, project_id);

            // si hay model_id el server resuelve la config guardada;
            // si no, mandamos epochs/stepsPerEpoch inline
            let req = if model_id.is_some() {
                JobRequest {
                    model_id,
                    config: None,
                }
            } else {
                JobRequest {
                    model_id: None,
                    config: Some(serde_json::json!({
                        "epochs": epochs,
                        "stepsPerEpoch": steps_per_epoch,
                    })),
                }
            };

            let resp = client.post(&url).json(&req).send().await?;
            if resp.status().is_success() {
                let job: JobRecord = resp.json().await?;
                println!("Job lanzado:");
                println!("  id: {}", job.id);
                println!("  estado: {:?}", job.status);
            } else {
                println!("Error lanzando job (status {})", resp.status());
            }
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/jobs/{}", base_url, id);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let job: JobRecord = resp.json().await?;
                print_job(&job);
            } else {
                println!("No se encontró el job con id {id}");
            }
        }

        Commands::Watch { id, interval_ms } => {
            let url = format!("{}/api/v1/jobs/{}", base_url, id);

            loop {
                let resp = client.get(&url).send().await?;
                if !resp.status().is_success() {
                    println!("No se encontró el job con id {id}");
                    break;
                }

                let job: JobRecord = resp.json().await?;

                match job.metrics.last() {
                    Some(last) => println!(
                        "[{:?}] {}%  step={} loss={:.4} accuracy={:.4}",
                        job.status, job.progress, last.step, last.loss, last.accuracy
                    ),
                    None => println!("[{:?}] {}%  (sin métricas todavía)", job.status, job.progress),
                }

                if job.status.is_terminal() {
                    println!();
                    print_job(&job);
                    break;
                }

                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
        }

        Commands::Cancel { id } => {
            let url = format!("{}/api/v1/jobs/{}/cancel", base_url, id);
            let resp = client.post(&url).send().await?;

            if resp.status().is_success() {
                let job: JobRecord = resp.json().await?;
                println!("Job cancelado:");
                println!("  id: {}", job.id);
                println!("  estado: {:?}", job.status);
                println!("  progreso: {}%", job.progress);
                println!("  samples persistidos: {}", job.metrics.len());
            } else {
                println!("No se pudo cancelar el job {id} (status {})", resp.status());
            }
        }
    }

    Ok(())
}
