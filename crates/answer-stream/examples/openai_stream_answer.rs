use std::sync::Arc;

use answer_stream::prelude::*;
use answer_stream::vendors::openai::OpenAiProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let harness = Harness::builder()
        .register_provider(Arc::new(OpenAiProvider::from_env()?))
        .build()?;

    let mut events = harness
        .generate_answer(
            &ProviderId::new("openai"),
            AnswerParams::new("Stream a short greeting."),
        )
        .await?;

    let mut printed = 0;
    while let Some(event) = events.next_event().await {
        match event {
            AnswerEvent::Answer { text, .. } => {
                print!("{}", text.get(printed..).unwrap_or(&text));
                printed = text.len();
            }
            AnswerEvent::Done => println!(),
            AnswerEvent::Error { error } => {
                if printed > 0 {
                    println!();
                }
                return Err(error.into());
            }
        }
    }
    Ok(())
}
