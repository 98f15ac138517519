//! Prompt text for the chat model and the auxiliary generation calls.

use crate::data_schema::{unicorns_schema_description, UNICORN_INDUSTRIES};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly assistant! Keep your responses concise and helpful. \
When the user asks about company valuations or other figures in the dataset, use the query_database tool. \
When the user asks about topics covered by the knowledge base, use the get_information tool and answer only \
from the returned passages, citing their source. If no relevant information is found, say so.";

/// Streamed to the caller when a turn ends without any model text.
pub const EMPTY_ANSWER_NOTICE: &str =
    "I wasn't able to finish answering within the allowed number of tool calls. Please try rephrasing your question.";

/// Appended to the context for the final pass once the step budget is spent.
pub const STEP_BUDGET_NOTICE: &str = "The tool budget for this turn is exhausted. \
Answer the user now using only the tool results above; do not request further tools.";

pub fn query_generation_system_prompt() -> String {
    let industries = UNICORN_INDUSTRIES
        .iter()
        .map(|industry| format!("- {}", industry))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a SQL (SQLite) and data visualization expert. Your job is to help the user write a SQL query to retrieve the data they need. The table schema is as follows:

{schema}

Only retrieval queries are allowed.

For things like industry, company names and other string fields, use the LIKE operator and convert both the search term and the field to lowercase using LOWER() function. For example: LOWER(industry) LIKE LOWER('%search_term%').

Note: select_investors is a comma-separated list of investors. Trim whitespace to ensure you're grouping properly. Note, some fields may be null or have only one value.
When answering questions about a specific field, ensure you are selecting the identifying column (ie. what is Vercel's valuation would select company and valuation).

The industries available are:
{industries}

If the user asks for a category that is not in the list, infer based on the list above.

Note: valuation is in billions of dollars so 10b would be 10.0.
Note: if the user asks for a rate, return it as a decimal. For example, 0.1 would be 10%.

If the user asks for 'over time' data, return by year using strftime('%Y', date_joined).

When searching for UK or USA, write out United Kingdom or United States respectively.

EVERY QUERY SHOULD RETURN QUANTITATIVE DATA THAT CAN BE PLOTTED ON A CHART! There should always be at least two columns. If the user asks for a single column, return the column and the count of the column.

Respond with a JSON object of the form {{"query": "<sql>"}}."#,
        schema = unicorns_schema_description(),
        industries = industries
    )
}

pub fn query_generation_prompt(request: &str) -> String {
    format!(
        "Generate the query necessary to retrieve the data the user wants: {}",
        request
    )
}

pub const CHART_SYSTEM_PROMPT: &str = "You are a data visualization expert. Respond with a single JSON object.";

pub fn chart_config_prompt(request: &str, data_json: &str) -> String {
    format!(
        r#"Given the following data from a SQL query result, generate the chart config that best visualises the data and answers the users query.
For multiple groups use multi-lines.

The config is a JSON object with these fields:
- "type": one of "bar", "line", "area", "pie"
- "title": chart title
- "description": what the chart shows and what is interesting about the way the data is displayed
- "takeaway": the main takeaway from the chart
- "xKey": key for the x-axis or category
- "yKeys": key(s) for the y-axis values, typically the quantitative columns
- "legend": whether to show a legend
- "multipleLines": for line charts only, whether the chart compares groups of data (optional)
- "measurementColumn": for line charts only, the quantitative column to measure against (optional)
- "lineCategories": for line charts only, the categories that each become a distinct line (optional)

Here is an example complete config:
{{"type": "pie", "title": "Sales by month", "description": "...", "takeaway": "...", "xKey": "month", "yKeys": ["sales", "profit", "expenses"], "legend": true}}

User Query:
{request}

Data:
{data}"#,
        request = request,
        data = data_json
    )
}

pub const TITLE_SYSTEM_PROMPT: &str = "You will generate a short title based on the first message a user begins a conversation with. \
Ensure it is not more than 80 characters long. The title should be a summary of the user's message. \
Do not use quotes or colons.";

pub const DOCUMENT_SYSTEM_PROMPT: &str = "Write about the given topic. Markdown is supported. Use headings wherever appropriate.";

pub fn document_update_prompt(current_content: &str, description: &str) -> String {
    format!(
        "Improve the following contents of the document based on the given prompt.\n\nDocument:\n{}\n\nPrompt:\n{}",
        current_content, description
    )
}
