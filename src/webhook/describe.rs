use serde_json::Value;

/// One-line summary of an event for the log, `{a.b}` placeholders are
/// looked up in the payload.
fn template(event_type: &str) -> Option<&'static str> {
    let template = match event_type {
        "commit_comment" => {
            "{comment.user.login} commented on {comment.commit_id} in {repository.full_name}"
        }
        "create" => "{sender.login} created {ref_type} ({ref}) in {repository.full_name}",
        "delete" => "{sender.login} deleted {ref_type} ({ref}) in {repository.full_name}",
        "deployment" => {
            "{sender.login} deployed {deployment.ref} to {deployment.environment} in {repository.full_name}"
        }
        "deployment_status" => {
            "deployment of {deployment.ref} to {deployment.environment} {deployment_status.state} in {repository.full_name}"
        }
        "fork" => "{forkee.owner.login} forked {forkee.name}",
        "gollum" => "{sender.login} edited wiki pages in {repository.full_name}",
        "issue_comment" => {
            "{sender.login} commented on issue #{issue.number} in {repository.full_name}"
        }
        "issues" => "{sender.login} {action} issue #{issue.number} in {repository.full_name}",
        "member" => "{sender.login} {action} member {member.login} in {repository.full_name}",
        "membership" => {
            "{sender.login} {action} member {member.login} to team {team.name} in {repository.full_name}"
        }
        "page_build" => "{sender.login} built pages in {repository.full_name}",
        "ping" => "ping from {sender.login}",
        "public" => "{sender.login} publicized {repository.full_name}",
        "pull_request" => {
            "{sender.login} {action} pull #{pull_request.number} in {repository.full_name}"
        }
        "pull_request_review" => {
            "{sender.login} {action} {review.state} review on pull #{pull_request.number} in {repository.full_name}"
        }
        "pull_request_review_comment" => {
            "{comment.user.login} {action} comment on pull #{pull_request.number} in {repository.full_name}"
        }
        "push" => "{pusher.name} pushed {ref} in {repository.full_name}",
        "release" => {
            "{release.author.login} {action} {release.tag_name} in {repository.full_name}"
        }
        "repository" => "{sender.login} {action} repository {repository.full_name}",
        "status" => "{sender.login} set {sha} status to {state} in {repository.full_name}",
        "team_add" => {
            "{sender.login} added repository {repository.full_name} to team {team.name}"
        }
        "watch" => "{sender.login} {action} watch in repository {repository.full_name}",
        _ => return None,
    };
    Some(template)
}

/// Falls back to the bare event type when the payload lacks a field.
pub fn describe(event_type: &str, payload: &Value) -> String {
    template(event_type)
        .and_then(|template| render(template, payload))
        .unwrap_or_else(|| event_type.to_owned())
}

fn render(template: &str, payload: &Value) -> Option<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let end = start + rest[start..].find('}')?;
        let value = rest[start + 1..end]
            .split('.')
            .try_fold(payload, |value, key| value.get(key))?;
        match value {
            Value::String(value) => rendered.push_str(value),
            Value::Null => return None,
            other => rendered.push_str(&other.to_string()),
        }
        rest = &rest[end + 1..];
    }
    rendered.push_str(rest);
    Some(rendered)
}
